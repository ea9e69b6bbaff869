pub mod anthropic;
pub mod api;
pub mod error;
pub mod google;
pub mod memory;

use crate::cli::Args;
use api::AppState;
use std::error::Error;

pub struct Server {
    addr: String,
    state: AppState,
    args: Args,
}

impl Server {
    pub fn new(addr: String, state: AppState, args: Args) -> Self {
        Self { addr, state, args }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        api::start_http_server(&self.addr, self.state.clone(), &self.args).await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::api::{ AppState, ModelSettings };
    use crate::history::{ ConversationStore, InMemoryConversationStore };
    use crate::llm::chat::anthropic::AnthropicChatClient;
    use crate::llm::chat::gemini::GeminiChatClient;
    use crate::llm::chat::openai::{ OpenAiChatClient, OpenAiOptions };
    use axum::body::{ to_bytes, Body };
    use axum::http::{ header, HeaderMap, Request, StatusCode };
    use axum::Router;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;
    use wiremock::MockServer;

    const TIMEOUT: Duration = Duration::from_secs(5);

    pub fn anthropic_state(server: &MockServer) -> AppState {
        let client = AnthropicChatClient::new("test-key".into(), server.uri(), TIMEOUT).unwrap();
        AppState::new(ModelSettings::default()).with_anthropic(client)
    }

    pub fn gemini_state(server: &MockServer) -> AppState {
        let client = GeminiChatClient::new("g-key".into(), server.uri(), TIMEOUT).unwrap();
        AppState::new(ModelSettings::default()).with_gemini(client)
    }

    /// In-memory store; chat is wired to `openai` when given.
    pub fn memory_state(openai: Option<&MockServer>, max_messages: usize) -> AppState {
        let store: Arc<dyn ConversationStore> = Arc::new(
            InMemoryConversationStore::new(max_messages)
        );
        let client = openai.map(|server|
            OpenAiChatClient::new("o-key".into(), server.uri(), TIMEOUT).unwrap()
        );
        AppState::new(ModelSettings::default()).with_memory(store, client, OpenAiOptions::default())
    }

    pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
    }

    pub async fn call_raw(app: Router, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, bytes.to_vec())
    }

    pub async fn call(app: Router, request: Request<Body>) -> (StatusCode, HeaderMap, serde_json::Value) {
        let (status, headers, bytes) = call_raw(app, request).await;
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, headers, body)
    }
}
