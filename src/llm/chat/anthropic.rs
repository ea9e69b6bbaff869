use async_trait::async_trait;
use log::{ debug, info };
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE }, StatusCode };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

use super::split_system;
use crate::llm::{
    build_http_client,
    check_status,
    endpoint,
    ChatProvider,
    ChatReply,
    LlmConfig,
    LlmType,
    ProviderError,
};
use crate::models::chat::{ ChatMessage, MessageType };

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_CITATIONS_MODEL: &str = "claude-opus-4-5";
pub const DEFAULT_SKILLS_MODEL: &str = "claude-sonnet-4-5";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_SKILLS_MAX_TOKENS: u32 = 16384;

const API_VERSION: &str = "2023-06-01";
const BETA_HEADER: &str = "anthropic-beta";
const SKILLS_BETA: &str = "code-execution-2025-08-25,skills-2025-10-02,files-api-2025-04-14";
const FILES_BETA: &str = "files-api-2025-04-14";
const CODE_EXECUTION_TOOL: &str = "code_execution_20250825";

/// Document-generation skills the Anthropic container can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skill {
    Xlsx,
    Pptx,
    Docx,
    Pdf,
}

impl Skill {
    pub fn skill_id(&self) -> &'static str {
        match self {
            Skill::Xlsx => "xlsx",
            Skill::Pptx => "pptx",
            Skill::Docx => "docx",
            Skill::Pdf => "pdf",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unsupported document type '{0}'. Supported types: excel, powerpoint, word, pdf")]
pub struct UnsupportedSkill(pub String);

impl FromStr for Skill {
    type Err = UnsupportedSkill;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "excel" => Ok(Skill::Xlsx),
            "powerpoint" => Ok(Skill::Pptx),
            "word" => Ok(Skill::Docx),
            "pdf" => Ok(Skill::Pdf),
            _ => Err(UnsupportedSkill(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CitationDocument {
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct AnthropicOptions {
    pub model: String,
    pub max_tokens: u32,
    pub citation_document: Option<CitationDocument>,
    pub skill: Option<Skill>,
}

impl Default for AnthropicOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_CITATIONS_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            citation_document: None,
            skill: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CitationKind {
    CharLocation,
    PageLocation,
    ContentBlockLocation,
}

/// A passage of a supplied document that the answer relies on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    #[serde(rename = "type")]
    pub kind: CitationKind,
    pub cited_text: String,
    pub document_index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_char_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_char_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_page_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_page_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_block_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_block_index: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnthropicUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

#[derive(Debug, Clone, Default)]
pub struct AnthropicMetadata {
    pub citations: Vec<Citation>,
    pub file_ids: Vec<String>,
    pub stop_reason: Option<String>,
    pub usage: Option<AnthropicUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    pub id: String,
    pub filename: String,
    pub mime_type: String,
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<RequestMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    container: Option<Container>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
}

#[derive(Serialize)]
struct RequestMessage {
    role: &'static str,
    content: Vec<RequestBlock>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RequestBlock {
    Text {
        text: String,
    },
    Document {
        source: DocumentSource,
        title: String,
        citations: CitationsToggle,
    },
}

#[derive(Serialize)]
struct DocumentSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'static str,
    data: String,
}

#[derive(Serialize)]
struct CitationsToggle {
    enabled: bool,
}

#[derive(Serialize)]
struct Container {
    skills: Vec<ContainerSkill>,
}

#[derive(Serialize)]
struct ContainerSkill {
    #[serde(rename = "type")]
    kind: &'static str,
    skill_id: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct Tool {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'static str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
        #[serde(default)]
        citations: Option<Vec<WireCitation>>,
    },
    BashCodeExecutionToolResult {
        #[serde(default)]
        content: serde_json::Value,
    },
    TextEditorCodeExecutionToolResult {
        #[serde(default)]
        content: serde_json::Value,
    },
    CodeExecutionToolResult {
        #[serde(default)]
        content: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireCitation {
    CharLocation {
        cited_text: String,
        document_index: u32,
        document_title: Option<String>,
        start_char_index: u32,
        end_char_index: u32,
    },
    PageLocation {
        cited_text: String,
        document_index: u32,
        document_title: Option<String>,
        start_page_number: u32,
        end_page_number: u32,
    },
    ContentBlockLocation {
        cited_text: String,
        document_index: u32,
        document_title: Option<String>,
        start_block_index: u32,
        end_block_index: u32,
    },
    #[serde(other)]
    Unsupported,
}

fn located(
    kind: CitationKind,
    cited_text: String,
    document_index: u32,
    document_title: Option<String>
) -> Citation {
    Citation {
        kind,
        cited_text,
        document_index,
        document_title,
        start_char_index: None,
        end_char_index: None,
        start_page_number: None,
        end_page_number: None,
        start_block_index: None,
        end_block_index: None,
    }
}

impl WireCitation {
    fn into_citation(self) -> Option<Citation> {
        match self {
            WireCitation::CharLocation {
                cited_text,
                document_index,
                document_title,
                start_char_index,
                end_char_index,
            } =>
                Some(Citation {
                    start_char_index: Some(start_char_index),
                    end_char_index: Some(end_char_index),
                    ..located(CitationKind::CharLocation, cited_text, document_index, document_title)
                }),
            WireCitation::PageLocation {
                cited_text,
                document_index,
                document_title,
                start_page_number,
                end_page_number,
            } =>
                Some(Citation {
                    start_page_number: Some(start_page_number),
                    end_page_number: Some(end_page_number),
                    ..located(CitationKind::PageLocation, cited_text, document_index, document_title)
                }),
            WireCitation::ContentBlockLocation {
                cited_text,
                document_index,
                document_title,
                start_block_index,
                end_block_index,
            } =>
                Some(Citation {
                    start_block_index: Some(start_block_index),
                    end_block_index: Some(end_block_index),
                    ..located(
                        CitationKind::ContentBlockLocation,
                        cited_text,
                        document_index,
                        document_title
                    )
                }),
            WireCitation::Unsupported => None,
        }
    }
}

/// Collects every `file_id` string nested anywhere in a tool result, keeping first-seen order.
fn collect_file_ids(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, nested) in map {
                if key == "file_id" {
                    if let Some(id) = nested.as_str() {
                        if !out.iter().any(|existing| existing == id) {
                            out.push(id.to_string());
                        }
                    }
                } else {
                    collect_file_ids(nested, out);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_file_ids(item, out);
            }
        }
        _ => {}
    }
}

fn into_reply(response: MessagesResponse) -> ChatReply<AnthropicMetadata> {
    let mut text = String::new();
    let mut citations = Vec::new();
    let mut file_ids = Vec::new();

    for block in response.content {
        match block {
            ContentBlock::Text { text: part, citations: cited } => {
                text.push_str(&part);
                citations.extend(
                    cited.unwrap_or_default().into_iter().filter_map(WireCitation::into_citation)
                );
            }
            ContentBlock::BashCodeExecutionToolResult { content }
            | ContentBlock::TextEditorCodeExecutionToolResult { content }
            | ContentBlock::CodeExecutionToolResult { content } => {
                collect_file_ids(&content, &mut file_ids);
            }
            ContentBlock::Other => {}
        }
    }

    ChatReply {
        text,
        metadata: AnthropicMetadata {
            citations,
            file_ids,
            stop_reason: response.stop_reason,
            usage: response.usage,
        },
    }
}

pub struct AnthropicChatClient {
    http: HttpClient,
    base_url: Url,
}

impl AnthropicChatClient {
    pub fn new(
        api_key: String,
        base_url: String,
        timeout: std::time::Duration
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        let mut key = HeaderValue::from_str(&api_key).map_err(|e|
            format!("Invalid API key format: {}", e)
        )?;
        key.set_sensitive(true);
        headers.insert("x-api-key", key);

        let parsed = Url::parse(&base_url).map_err(|e|
            format!("Invalid Anthropic base URL '{}': {}", base_url, e)
        )?;
        if parsed.cannot_be_a_base() {
            return Err(format!("Invalid Anthropic base URL '{}': not a base URL", base_url).into());
        }

        Ok(Self {
            http: build_http_client(headers, timeout)?,
            base_url: parsed,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = config.require_api_key()?;
        let base_url = config.base_url_or(DEFAULT_BASE_URL)?;
        Self::new(api_key, base_url, config.timeout)
    }

    fn build_request<'a>(
        context: &[ChatMessage],
        user_message: &str,
        options: &'a AnthropicOptions
    ) -> MessagesRequest<'a> {
        let (system, turns) = split_system(context);
        let mut messages: Vec<RequestMessage> = turns
            .into_iter()
            .map(|m| RequestMessage {
                role: match m.message_type {
                    MessageType::Assistant => "assistant",
                    _ => "user",
                },
                content: vec![RequestBlock::Text { text: m.content.clone() }],
            })
            .collect();

        let mut content = Vec::new();
        if let Some(document) = &options.citation_document {
            content.push(RequestBlock::Document {
                source: DocumentSource {
                    kind: "text",
                    media_type: "text/plain",
                    data: document.text.clone(),
                },
                title: document.title.clone(),
                citations: CitationsToggle { enabled: true },
            });
        }
        content.push(RequestBlock::Text { text: user_message.to_string() });
        messages.push(RequestMessage { role: "user", content });

        let (container, tools) = match options.skill {
            Some(skill) =>
                (
                    Some(Container {
                        skills: vec![ContainerSkill {
                            kind: "anthropic",
                            skill_id: skill.skill_id(),
                            version: "latest",
                        }],
                    }),
                    vec![Tool { kind: CODE_EXECUTION_TOOL, name: "code_execution" }],
                ),
            None => (None, Vec::new()),
        };

        MessagesRequest {
            model: &options.model,
            max_tokens: options.max_tokens,
            system,
            messages,
            container,
            tools,
        }
    }

    /// `file_id` is pushed as a single escaped path segment, so it cannot leave `/v1/files/`.
    fn file_url(&self, file_id: &str, content: bool) -> String {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["v1", "files"]).push(file_id);
            if content {
                segments.push("content");
            }
        }
        url.to_string()
    }

    pub async fn file_metadata(&self, file_id: &str) -> Result<FileMetadata, ProviderError> {
        let url = self.file_url(file_id, false);
        let response = self.get_file_resource(&url, file_id).await?;
        response.json::<FileMetadata>().await.map_err(|e| ProviderError::transport(LlmType::Anthropic, e))
    }

    pub async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, ProviderError> {
        let url = self.file_url(file_id, true);
        let response = self.get_file_resource(&url, file_id).await?;
        let bytes = response
            .bytes().await
            .map_err(|e| ProviderError::transport(LlmType::Anthropic, e))?;
        info!("Downloaded Anthropic file {} ({} bytes)", file_id, bytes.len());
        Ok(bytes.to_vec())
    }

    async fn get_file_resource(
        &self,
        url: &str,
        file_id: &str
    ) -> Result<reqwest::Response, ProviderError> {
        let response = self.http
            .get(url)
            .header(BETA_HEADER, FILES_BETA)
            .send().await
            .map_err(|e| ProviderError::transport(LlmType::Anthropic, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound(format!("File not found: {}", file_id)));
        }
        check_status(LlmType::Anthropic, response).await
    }
}

#[async_trait]
impl ChatProvider for AnthropicChatClient {
    type Options = AnthropicOptions;
    type Metadata = AnthropicMetadata;

    async fn send(
        &self,
        context: &[ChatMessage],
        user_message: &str,
        options: &AnthropicOptions
    ) -> Result<ChatReply<AnthropicMetadata>, ProviderError> {
        let url = endpoint(self.base_url.as_str(), "/v1/messages");
        let payload = Self::build_request(context, user_message, options);
        debug!(
            "AnthropicChatClient::send() → model={} skill={:?} citations={}",
            options.model,
            options.skill,
            options.citation_document.is_some()
        );

        let mut request = self.http.post(&url).json(&payload);
        if options.skill.is_some() {
            request = request.header(BETA_HEADER, SKILLS_BETA);
        }

        let response = request.send().await.map_err(|e| ProviderError::transport(LlmType::Anthropic, e))?;
        let body = check_status(LlmType::Anthropic, response).await?
            .json::<MessagesResponse>().await
            .map_err(|e| ProviderError::transport(LlmType::Anthropic, e))?;

        Ok(into_reply(body))
    }
}
