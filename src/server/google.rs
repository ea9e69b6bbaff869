use axum::{ extract::{ rejection::JsonRejection, State }, routing::post, Json, Router };
use serde::{ Deserialize, Serialize };

use crate::llm::chat::gemini::{
    GeminiOptions,
    SafetyRating,
    ThinkingOptions,
    DYNAMIC_THINKING_BUDGET,
};
use crate::llm::ChatProvider;
use crate::server::api::{ AppState, ChatRequest };
use crate::server::error::{ require_text, ApiError };

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingRequest {
    pub message: String,
    pub thinking_budget: Option<i32>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeChatResponse {
    pub response: String,
    pub safety_ratings: Vec<SafetyRating>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingResponse {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thoughts: Option<String>,
    pub thinking_budget: i32,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/google/chat", post(chat_handler))
        .route("/api/google/chat/safe", post(safe_chat_handler))
        .route("/api/google/chat/think", post(thinking_chat_handler))
}

fn chat_options(state: &AppState) -> GeminiOptions {
    GeminiOptions {
        model: state.models.gemini_chat_model.clone(),
        ..Default::default()
    }
}

async fn chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload?;
    require_text("message", &request.message)?;
    let reply = state.gemini()?.send(&[], &request.message, &chat_options(&state)).await?;
    Ok(Json(ChatResponse { response: reply.text }))
}

async fn safe_chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>
) -> Result<Json<SafeChatResponse>, ApiError> {
    let Json(request) = payload?;
    require_text("message", &request.message)?;
    let reply = state.gemini()?.send(&[], &request.message, &chat_options(&state)).await?;
    Ok(
        Json(SafeChatResponse {
            response: reply.text,
            safety_ratings: reply.metadata.safety_ratings,
        })
    )
}

/// Budget -1 lets the model decide, 0 switches reasoning off, anything positive caps it.
async fn thinking_chat_handler(
    State(state): State<AppState>,
    payload: Result<Json<ThinkingRequest>, JsonRejection>
) -> Result<Json<ThinkingResponse>, ApiError> {
    let Json(request) = payload?;
    let budget = request.thinking_budget.unwrap_or(DYNAMIC_THINKING_BUDGET);
    if budget < DYNAMIC_THINKING_BUDGET {
        return Err(
            ApiError::BadRequest(
                format!("thinkingBudget must be -1 (dynamic), 0 (off) or a positive token count, got {}", budget)
            )
        );
    }
    require_text("message", &request.message)?;
    let client = state.gemini()?;

    let options = GeminiOptions {
        model: state.models.gemini_thinking_model.clone(),
        max_output_tokens: None,
        thinking: Some(ThinkingOptions {
            budget,
            include_thoughts: budget != 0,
        }),
    };
    let reply = client.send(&[], &request.message, &options).await?;

    Ok(
        Json(ThinkingResponse {
            response: reply.text,
            thoughts: if budget == 0 { None } else { reply.metadata.thoughts },
            thinking_budget: budget,
        })
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::chat::gemini::{ DEFAULT_CHAT_MODEL, DEFAULT_THINKING_MODEL };
    use crate::server::test_support::{ call, gemini_state, json_request };
    use axum::http::StatusCode;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{ body_partial_json, method, path };
    use wiremock::{ Mock, MockServer, ResponseTemplate };

    fn app(server: &MockServer) -> Router {
        crate::server::api::router(gemini_state(server), Duration::from_secs(5))
    }

    fn thinking_path() -> String {
        format!("/v1beta/models/{}:generateContent", DEFAULT_THINKING_MODEL)
    }

    #[tokio::test]
    async fn safe_chat_returns_ratings() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/v1beta/models/{}:generateContent", DEFAULT_CHAT_MODEL)))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(
                    json!({
                    "candidates": [{
                        "content": {"parts": [{"text": "Hi!"}]},
                        "safetyRatings": [{"category": "HARM_CATEGORY_HARASSMENT", "probability": "NEGLIGIBLE"}]
                    }]
                })
                )
            )
            .mount(&server).await;

        let (status, _, body) = call(
            app(&server),
            json_request("POST", "/api/google/chat/safe", json!({"message": "hello"}))
        ).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "Hi!");
        assert_eq!(body["safetyRatings"][0]["category"], "HARM_CATEGORY_HARASSMENT");
        assert_eq!(body["safetyRatings"][0]["probability"], "NEGLIGIBLE");
    }

    #[tokio::test]
    async fn omitted_budget_is_dynamic() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(thinking_path()))
            .and(
                body_partial_json(
                    json!({"generationConfig": {"thinkingConfig": {"thinkingBudget": -1, "includeThoughts": true}}})
                )
            )
            .respond_with(
                ResponseTemplate::new(200).set_body_json(
                    json!({
                    "candidates": [{"content": {"parts": [
                        {"text": "Compare the digits.", "thought": true},
                        {"text": "9.11 is smaller."}
                    ]}}]
                })
                )
            )
            .expect(1)
            .mount(&server).await;

        let (status, _, body) = call(
            app(&server),
            json_request("POST", "/api/google/chat/think", json!({"message": "9.11 or 9.9?"}))
        ).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "9.11 is smaller.");
        assert_eq!(body["thoughts"], "Compare the digits.");
        assert_eq!(body["thinkingBudget"], -1);
    }

    #[tokio::test]
    async fn zero_budget_omits_thoughts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(thinking_path()))
            .and(
                body_partial_json(
                    json!({"generationConfig": {"thinkingConfig": {"thinkingBudget": 0, "includeThoughts": false}}})
                )
            )
            .respond_with(
                ResponseTemplate::new(200).set_body_json(
                    json!({"candidates": [{"content": {"parts": [{"text": "Paris."}]}}]})
                )
            )
            .expect(1)
            .mount(&server).await;

        let (status, _, body) = call(
            app(&server),
            json_request(
                "POST",
                "/api/google/chat/think",
                json!({"message": "Capital of France?", "thinkingBudget": 0})
            )
        ).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "Paris.");
        assert!(body.get("thoughts").is_none());
        assert_eq!(body["thinkingBudget"], 0);
    }

    #[tokio::test]
    async fn budget_below_dynamic_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server).await;

        let (status, _, body) = call(
            app(&server),
            json_request("POST", "/api/google/chat/think", json!({"message": "hi", "thinkingBudget": -5}))
        ).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("-5"));
    }

    #[tokio::test]
    async fn upstream_failure_is_bad_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429).set_body_json(
                    json!({"error": {"code": 429, "message": "Resource has been exhausted"}})
                )
            )
            .mount(&server).await;

        let (status, _, body) = call(
            app(&server),
            json_request("POST", "/api/google/chat", json!({"message": "hi"}))
        ).await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        let message = body["error"].as_str().unwrap();
        assert!(message.contains("Google Gemini"));
        assert!(message.contains("429"));
        assert!(!message.contains("g-key"));
    }

    #[tokio::test]
    async fn missing_message_gets_json_error() {
        let server = MockServer::start().await;
        let (status, _, body) = call(app(&server), json_request("POST", "/api/google/chat", json!({}))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("message"));
    }

    #[tokio::test]
    async fn slow_provider_is_gateway_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"candidates": [{"content": {"parts": [{"text": "late"}]}}]}))
                    .set_delay(Duration::from_secs(3))
            )
            .mount(&server).await;

        let timeout = Duration::from_secs(1);
        let client = crate::llm::chat::gemini::GeminiChatClient
            ::new("g-key".into(), server.uri(), timeout)
            .unwrap();
        let state = crate::server::api::AppState::new(Default::default()).with_gemini(client);

        let (status, _, body) = call(
            crate::server::api::router(state, timeout),
            json_request("POST", "/api/google/chat", json!({"message": "hi"}))
        ).await;

        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["error"], "Google Gemini request timed out");
    }
}
