use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{ IntoResponse, Response },
    Json,
};
use log::{ error, warn };
use serde::Serialize;
use thiserror::Error;

use crate::history::{ MemoryChatError, StoreError };
use crate::llm::chat::anthropic::UnsupportedSkill;
use crate::llm::ProviderError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")] BadRequest(String),
    #[error("{0}")] NotFound(String),
    #[error("{0} is not configured")] NotConfigured(String),
    #[error(transparent)] Provider(#[from] ProviderError),
    #[error(transparent)] Store(#[from] StoreError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) | ApiError::Provider(ProviderError::NotFound(_)) =>
                StatusCode::NOT_FOUND,
            ApiError::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Provider(ProviderError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Provider(_) => StatusCode::BAD_GATEWAY,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<MemoryChatError> for ApiError {
    fn from(e: MemoryChatError) -> Self {
        match e {
            MemoryChatError::Store(e) => ApiError::Store(e),
            MemoryChatError::Provider(e) => ApiError::Provider(e),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<UnsupportedSkill> for ApiError {
    fn from(e: UnsupportedSkill) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed ({}): {}", status, self);
        } else {
            warn!("Request rejected ({}): {}", status, self);
        }
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

pub fn require_text(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("'{}' must not be empty", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmType;

    #[test]
    fn provider_failures_map_to_gateway_statuses() {
        let api = ApiError::from(ProviderError::Api {
            provider: LlmType::Anthropic,
            status: 401,
            message: "invalid x-api-key".into(),
        });
        assert_eq!(api.status(), StatusCode::BAD_GATEWAY);
        assert!(api.to_string().contains("HTTP 401"));

        let timeout = ApiError::from(ProviderError::Timeout { provider: LlmType::Gemini });
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);

        let missing = ApiError::from(ProviderError::NotFound("File not found: x".into()));
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn blank_text_is_rejected() {
        assert!(require_text("message", "  ").is_err());
        assert!(require_text("message", "hi").is_ok());
    }
}
