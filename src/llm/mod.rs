pub mod chat;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::models::chat::ChatMessage;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmType {
    Anthropic,
    Gemini,
    OpenAI,
}

impl fmt::Display for LlmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LlmType::Anthropic => "Anthropic",
            LlmType::Gemini => "Google Gemini",
            LlmType::OpenAI => "OpenAI",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub llm_type: LlmType,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Duration,
}

impl LlmConfig {
    pub fn new(llm_type: LlmType, api_key: &str, base_url: Option<String>, timeout: Duration) -> Self {
        let api_key = Some(api_key.trim().to_string()).filter(|k| !k.is_empty());
        let base_url = base_url.filter(|u| !u.trim().is_empty());
        Self { llm_type, api_key, base_url, timeout }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn require_api_key(&self) -> Result<String, Box<dyn StdError + Send + Sync>> {
        self.api_key.clone().ok_or_else(|| format!("{} API key is required", self.llm_type).into())
    }

    /// Configured base URL, or `default`. Either way it must parse as an absolute URL.
    pub fn base_url_or(&self, default: &str) -> Result<String, Box<dyn StdError + Send + Sync>> {
        let raw = self.base_url.as_deref().unwrap_or(default);
        let parsed = url::Url
            ::parse(raw)
            .map_err(|e| format!("Invalid {} base URL '{}': {}", self.llm_type, raw, e))?;
        Ok(parsed.as_str().trim_end_matches('/').to_string())
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} request failed: {source}")] Http {
        provider: LlmType,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} returned HTTP {status}: {message}")] Api {
        provider: LlmType,
        status: u16,
        message: String,
    },

    #[error("{provider} request timed out")] Timeout {
        provider: LlmType,
    },

    #[error("{0}")] NotFound(String),

    #[error("{provider} returned a malformed response: {message}")] Malformed {
        provider: LlmType,
        message: String,
    },
}

impl ProviderError {
    /// Classifies a reqwest failure. The URL is stripped so query strings never reach callers.
    pub fn transport(provider: LlmType, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ProviderError::Timeout { provider }
        } else if error.is_decode() {
            ProviderError::Malformed {
                provider,
                message: error.without_url().to_string(),
            }
        } else {
            ProviderError::Http { provider, source: error.without_url() }
        }
    }

    pub fn malformed(provider: LlmType, message: impl Into<String>) -> Self {
        ProviderError::Malformed { provider, message: message.into() }
    }
}

/// A provider answer: the assistant text plus the typed extras the provider reported.
#[derive(Debug, Clone)]
pub struct ChatReply<M> {
    pub text: String,
    pub metadata: M,
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    type Options: Send + Sync;
    type Metadata: Send;

    /// Sends `context` followed by `user_message` as a single completion request.
    async fn send(
        &self,
        context: &[ChatMessage],
        user_message: &str,
        options: &Self::Options
    ) -> Result<ChatReply<Self::Metadata>, ProviderError>;
}

pub fn build_http_client(
    headers: HeaderMap,
    timeout: Duration
) -> Result<reqwest::Client, Box<dyn StdError + Send + Sync>> {
    reqwest::Client
        ::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

const MAX_ERROR_BODY: usize = 512;

/// Passes successful responses through and turns anything else into `ProviderError::Api`.
///
/// All three vendors wrap failures as `{"error": {"message": ...}}`; other bodies are
/// reported verbatim, truncated.
pub async fn check_status(
    provider: LlmType,
    response: reqwest::Response
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Api {
        provider,
        status: status.as_u16(),
        message: error_message(status, &body),
    })
}

fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        return envelope.error.message;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status.canonical_reason().unwrap_or("request failed").to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY).collect()
}

pub fn endpoint(base_url: &str, route: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), route)
}
