use async_trait::async_trait;
use log::debug;
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE } };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;

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

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_THINKING_MODEL: &str = "gemini-2.5-pro";

/// Lets the model decide how much to think.
pub const DYNAMIC_THINKING_BUDGET: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkingOptions {
    pub budget: i32,
    pub include_thoughts: bool,
}

#[derive(Debug, Clone)]
pub struct GeminiOptions {
    pub model: String,
    pub max_output_tokens: Option<u32>,
    pub thinking: Option<ThinkingOptions>,
}

impl Default for GeminiOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_CHAT_MODEL.to_string(),
            max_output_tokens: None,
            thinking: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyRating {
    pub category: String,
    pub probability: String,
    #[serde(default)]
    pub blocked: bool,
}

#[derive(Debug, Clone, Default)]
pub struct GeminiMetadata {
    pub safety_ratings: Vec<SafetyRating>,
    pub thoughts: Option<String>,
    pub finish_reason: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: i32,
    include_thoughts: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
    #[serde(default)]
    safety_ratings: Vec<SafetyRating>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

fn into_reply(response: GenerateContentResponse) -> Result<ChatReply<GeminiMetadata>, ProviderError> {
    let candidate = match response.candidates.into_iter().next() {
        Some(candidate) => candidate,
        None => {
            if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
                return Err(ProviderError::Api {
                    provider: LlmType::Gemini,
                    status: 200,
                    message: format!("prompt blocked: {}", reason),
                });
            }
            return Err(ProviderError::malformed(LlmType::Gemini, "response has no candidates"));
        }
    };

    let mut text = String::new();
    let mut thoughts = String::new();
    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
    for part in parts {
        if let Some(chunk) = part.text {
            if part.thought {
                thoughts.push_str(&chunk);
            } else {
                text.push_str(&chunk);
            }
        }
    }

    Ok(ChatReply {
        text,
        metadata: GeminiMetadata {
            safety_ratings: candidate.safety_ratings,
            thoughts: Some(thoughts).filter(|t| !t.is_empty()),
            finish_reason: candidate.finish_reason,
        },
    })
}

pub struct GeminiChatClient {
    http: HttpClient,
    base_url: String,
}

impl GeminiChatClient {
    pub fn new(
        api_key: String,
        base_url: String,
        timeout: std::time::Duration
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut key = HeaderValue::from_str(&api_key).map_err(|e|
            format!("Invalid API key format: {}", e)
        )?;
        key.set_sensitive(true);
        headers.insert("x-goog-api-key", key);

        Ok(Self {
            http: build_http_client(headers, timeout)?,
            base_url,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = config.require_api_key()?;
        let base_url = config.base_url_or(DEFAULT_BASE_URL)?;
        Self::new(api_key, base_url, config.timeout)
    }

    fn build_request(
        context: &[ChatMessage],
        user_message: &str,
        options: &GeminiOptions
    ) -> GenerateContentRequest {
        let (system, turns) = split_system(context);
        let mut contents: Vec<Content> = turns
            .into_iter()
            .map(|m| Content {
                role: Some(match m.message_type {
                    MessageType::Assistant => "model",
                    _ => "user",
                }),
                parts: vec![Part { text: m.content.clone() }],
            })
            .collect();
        contents.push(Content {
            role: Some("user"),
            parts: vec![Part { text: user_message.to_string() }],
        });

        let thinking_config = options.thinking.map(|t| ThinkingConfig {
            thinking_budget: t.budget,
            include_thoughts: t.include_thoughts,
        });
        let generation_config = if options.max_output_tokens.is_some() || thinking_config.is_some() {
            Some(GenerationConfig {
                max_output_tokens: options.max_output_tokens,
                thinking_config,
            })
        } else {
            None
        };

        GenerateContentRequest {
            contents,
            system_instruction: system.map(|text| Content {
                role: None,
                parts: vec![Part { text }],
            }),
            generation_config,
        }
    }
}

#[async_trait]
impl ChatProvider for GeminiChatClient {
    type Options = GeminiOptions;
    type Metadata = GeminiMetadata;

    async fn send(
        &self,
        context: &[ChatMessage],
        user_message: &str,
        options: &GeminiOptions
    ) -> Result<ChatReply<GeminiMetadata>, ProviderError> {
        let url = endpoint(
            &self.base_url,
            &format!("/v1beta/models/{}:generateContent", options.model)
        );
        debug!(
            "GeminiChatClient::send() → model={} thinking={:?}",
            options.model,
            options.thinking
        );

        let payload = Self::build_request(context, user_message, options);
        let response = self.http
            .post(&url)
            .json(&payload)
            .send().await
            .map_err(|e| ProviderError::transport(LlmType::Gemini, e))?;
        let body = check_status(LlmType::Gemini, response).await?
            .json::<GenerateContentResponse>().await
            .map_err(|e| ProviderError::transport(LlmType::Gemini, e))?;

        into_reply(body)
    }
}
