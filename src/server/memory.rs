use axum::{
    extract::{ rejection::JsonRejection, Path, State },
    routing::{ get, post },
    Json,
    Router,
};
use log::info;
use serde::Serialize;

use crate::models::chat::{ ChatMessage, MessageType };
use crate::server::api::{ AppState, ChatRequest };
use crate::server::error::{ require_text, ApiError };

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryChatResponse {
    pub conversation_id: String,
    pub response: String,
}

#[derive(Serialize)]
pub struct HistoryEntry {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub content: String,
}

impl From<ChatMessage> for HistoryEntry {
    fn from(message: ChatMessage) -> Self {
        Self {
            message_type: message.message_type,
            content: message.content,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub conversation_id: String,
    pub message_count: usize,
    pub messages: Vec<HistoryEntry>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationsResponse {
    pub count: usize,
    pub conversation_ids: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub conversation_id: String,
    pub deleted: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/redis/chat/{conversation_id}", post(chat_handler))
        .route("/api/redis/history/{conversation_id}", get(history_handler).delete(delete_handler))
        .route("/api/redis/conversations", get(conversations_handler))
}

async fn chat_handler(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
    payload: Result<Json<ChatRequest>, JsonRejection>
) -> Result<Json<MemoryChatResponse>, ApiError> {
    let Json(request) = payload?;
    require_text("message", &request.message)?;
    let reply = state.memory_chat()?.chat(&conversation_id, &request.message).await?;
    Ok(
        Json(MemoryChatResponse {
            conversation_id,
            response: reply.text,
        })
    )
}

async fn history_handler(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>
) -> Result<Json<HistoryResponse>, ApiError> {
    let conversation = state.store()?.get_conversation(&conversation_id).await?;
    let messages: Vec<HistoryEntry> = conversation.messages.into_iter().map(HistoryEntry::from).collect();
    Ok(
        Json(HistoryResponse {
            conversation_id: conversation.id,
            message_count: messages.len(),
            messages,
        })
    )
}

async fn conversations_handler(
    State(state): State<AppState>
) -> Result<Json<ConversationsResponse>, ApiError> {
    let conversation_ids = state.store()?.list_conversation_ids().await?;
    Ok(
        Json(ConversationsResponse {
            count: conversation_ids.len(),
            conversation_ids,
        })
    )
}

async fn delete_handler(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>
) -> Result<Json<DeleteResponse>, ApiError> {
    state.store()?.delete(&conversation_id).await?;
    info!("Cleared conversation {}", conversation_id);
    Ok(
        Json(DeleteResponse {
            conversation_id,
            deleted: true,
        })
    )
}

#[cfg(test)]
mod tests {
    use crate::server::test_support::{ call, empty_request, json_request, memory_state };
    use axum::http::StatusCode;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{ method, path };
    use wiremock::{ Mock, MockServer, ResponseTemplate };

    async fn openai_mock() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(
                    json!({
                    "choices": [{"message": {"role": "assistant", "content": "Hello!"}, "finish_reason": "stop"}]
                })
                )
            )
            .mount(&server).await;
        server
    }

    #[tokio::test]
    async fn two_turns_produce_four_messages_in_order() {
        let server = openai_mock().await;
        let app = crate::server::api::router(memory_state(Some(&server), 20), Duration::from_secs(5));

        for _ in 0..2 {
            let (status, _, body) = call(
                app.clone(),
                json_request("POST", "/api/redis/chat/abc", json!({"message": "hi"}))
            ).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["conversationId"], "abc");
            assert_eq!(body["response"], "Hello!");
        }

        let (status, _, body) = call(app.clone(), empty_request("GET", "/api/redis/history/abc")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["messageCount"], 4);
        let types: Vec<&str> = body["messages"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["type"].as_str().unwrap())
            .collect();
        assert_eq!(types, vec!["USER", "ASSISTANT", "USER", "ASSISTANT"]);
        assert_eq!(body["messages"][0]["content"], "hi");

        let (_, _, body) = call(app, empty_request("GET", "/api/redis/conversations")).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["conversationIds"], json!(["abc"]));
    }

    #[tokio::test]
    async fn delete_clears_history_and_accepts_unknown_ids() {
        let server = openai_mock().await;
        let app = crate::server::api::router(memory_state(Some(&server), 20), Duration::from_secs(5));
        call(app.clone(), json_request("POST", "/api/redis/chat/abc", json!({"message": "hi"}))).await;

        let (status, _, body) = call(app.clone(), empty_request("DELETE", "/api/redis/history/abc")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"conversationId": "abc", "deleted": true}));

        let (_, _, body) = call(app.clone(), empty_request("GET", "/api/redis/history/abc")).await;
        assert_eq!(body["messageCount"], 0);

        let (status, _, body) = call(app, empty_request("DELETE", "/api/redis/history/never-used")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], true);
    }

    #[tokio::test]
    async fn provider_failure_leaves_history_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({"error": {"message": "server overloaded"}}))
            )
            .mount(&server).await;
        let app = crate::server::api::router(memory_state(Some(&server), 20), Duration::from_secs(5));

        let (status, _, body) = call(
            app.clone(),
            json_request("POST", "/api/redis/chat/abc", json!({"message": "hi"}))
        ).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("server overloaded"));

        let (_, _, body) = call(app, empty_request("GET", "/api/redis/history/abc")).await;
        assert_eq!(body["messageCount"], 0);
    }

    #[tokio::test]
    async fn chat_without_openai_is_unavailable_but_history_works() {
        let app = crate::server::api::router(memory_state(None, 20), Duration::from_secs(5));

        let (status, _, body) = call(
            app.clone(),
            json_request("POST", "/api/redis/chat/abc", json!({"message": "hi"}))
        ).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "OpenAI is not configured");

        let (status, _, _) = call(app, empty_request("GET", "/api/redis/conversations")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn memory_routes_without_store_are_unavailable() {
        let app = crate::server::api::router(
            crate::server::api::AppState::new(Default::default()),
            Duration::from_secs(5)
        );
        let (status, _, body) = call(app, empty_request("GET", "/api/redis/conversations")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "Conversation memory is not configured");
    }

    #[tokio::test]
    async fn malformed_body_gets_json_error() {
        let server = openai_mock().await;
        let app = crate::server::api::router(memory_state(Some(&server), 20), Duration::from_secs(5));

        let (status, _, body) = call(app.clone(), json_request("POST", "/api/redis/chat/abc", json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("message"));

        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/api/redis/chat/abc")
            .header(axum::http::header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from("{not json"))
            .unwrap();
        let (status, _, body) = call(app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }
}
