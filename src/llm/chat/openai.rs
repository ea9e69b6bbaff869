use async_trait::async_trait;
use log::debug;
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;

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
use crate::models::chat::ChatMessage;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct OpenAiOptions {
    pub model: String,
    pub max_completion_tokens: Option<u32>,
}

impl Default for OpenAiOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_CHAT_MODEL.to_string(),
            max_completion_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenAiUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Default)]
pub struct OpenAiMetadata {
    pub finish_reason: Option<String>,
    pub usage: Option<OpenAiUsage>,
}

#[derive(Serialize)]
struct OpenAIMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

pub struct OpenAiChatClient {
    http: HttpClient,
    base_url: String,
}

impl OpenAiChatClient {
    pub fn new(
        api_key: String,
        base_url: String,
        timeout: std::time::Duration
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key)).map_err(|e|
            format!("Invalid API key format: {}", e)
        )?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

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
}

#[async_trait]
impl ChatProvider for OpenAiChatClient {
    type Options = OpenAiOptions;
    type Metadata = OpenAiMetadata;

    async fn send(
        &self,
        context: &[ChatMessage],
        user_message: &str,
        options: &OpenAiOptions
    ) -> Result<ChatReply<OpenAiMetadata>, ProviderError> {
        let url = endpoint(&self.base_url, "/v1/chat/completions");

        let mut messages: Vec<OpenAIMessage> = context
            .iter()
            .map(|m| OpenAIMessage {
                role: m.message_type.as_role(),
                content: &m.content,
            })
            .collect();
        messages.push(OpenAIMessage { role: "user", content: user_message });

        let req = OpenAIChatRequest {
            model: &options.model,
            messages,
            max_completion_tokens: options.max_completion_tokens,
        };
        debug!(
            "OpenAiChatClient::send() → model={} messages={}",
            options.model,
            req.messages.len()
        );

        let response = self.http
            .post(&url)
            .json(&req)
            .send().await
            .map_err(|e| ProviderError::transport(LlmType::OpenAI, e))?;
        let resp = check_status(LlmType::OpenAI, response).await?
            .json::<OpenAIResponse>().await
            .map_err(|e| ProviderError::transport(LlmType::OpenAI, e))?;

        let choice = resp.choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::malformed(LlmType::OpenAI, "No response from OpenAI API"))?;

        Ok(ChatReply {
            text: choice.message.content.unwrap_or_default(),
            metadata: OpenAiMetadata {
                finish_reason: choice.finish_reason,
                usage: resp.usage,
            },
        })
    }
}
