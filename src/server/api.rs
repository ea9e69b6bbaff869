use crate::cli::Args;
use crate::history::{ create_history_store, ConversationStore, MemoryChat };
use crate::llm::chat::anthropic::{ self, AnthropicChatClient };
use crate::llm::chat::gemini::{ self, GeminiChatClient };
use crate::llm::chat::openai::{ OpenAiChatClient, OpenAiOptions };
use crate::llm::{ LlmConfig, LlmType };
use crate::server::error::ApiError;
use crate::server::{ anthropic as anthropic_routes, google, memory };
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use axum::{ routing::get, Router, extract::State, Json };
use serde::{ Deserialize, Serialize };
use tower_http::cors::{ Any, CorsLayer };
use tower_http::timeout::TimeoutLayer;
use log::{ info, warn };

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    memory_enabled: bool,
}

/// Model names and token budgets each route asks its provider for.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub anthropic_citations_model: String,
    pub anthropic_skills_model: String,
    pub anthropic_max_tokens: u32,
    pub anthropic_skills_max_tokens: u32,
    pub gemini_chat_model: String,
    pub gemini_thinking_model: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            anthropic_citations_model: anthropic::DEFAULT_CITATIONS_MODEL.to_string(),
            anthropic_skills_model: anthropic::DEFAULT_SKILLS_MODEL.to_string(),
            anthropic_max_tokens: anthropic::DEFAULT_MAX_TOKENS,
            anthropic_skills_max_tokens: anthropic::DEFAULT_SKILLS_MAX_TOKENS,
            gemini_chat_model: gemini::DEFAULT_CHAT_MODEL.to_string(),
            gemini_thinking_model: gemini::DEFAULT_THINKING_MODEL.to_string(),
        }
    }
}

impl ModelSettings {
    pub fn from_args(args: &Args) -> Self {
        Self {
            anthropic_citations_model: args.anthropic_citations_model.clone(),
            anthropic_skills_model: args.anthropic_skills_model.clone(),
            anthropic_max_tokens: args.anthropic_max_tokens,
            anthropic_skills_max_tokens: args.anthropic_skills_max_tokens,
            gemini_chat_model: args.gemini_chat_model.clone(),
            gemini_thinking_model: args.gemini_thinking_model.clone(),
        }
    }
}

/// Collaborators shared by every handler. Anything left `None` was not configured.
#[derive(Clone)]
pub struct AppState {
    pub anthropic: Option<Arc<AnthropicChatClient>>,
    pub gemini: Option<Arc<GeminiChatClient>>,
    pub store: Option<Arc<dyn ConversationStore>>,
    pub memory_chat: Option<MemoryChat<OpenAiChatClient>>,
    pub models: Arc<ModelSettings>,
}

impl AppState {
    pub fn new(models: ModelSettings) -> Self {
        Self {
            anthropic: None,
            gemini: None,
            store: None,
            memory_chat: None,
            models: Arc::new(models),
        }
    }

    pub fn with_anthropic(mut self, client: AnthropicChatClient) -> Self {
        self.anthropic = Some(Arc::new(client));
        self
    }

    pub fn with_gemini(mut self, client: GeminiChatClient) -> Self {
        self.gemini = Some(Arc::new(client));
        self
    }

    /// Enables the conversation routes. Chat additionally needs an OpenAI client.
    pub fn with_memory(
        mut self,
        store: Arc<dyn ConversationStore>,
        openai: Option<OpenAiChatClient>,
        options: OpenAiOptions
    ) -> Self {
        self.memory_chat = openai.map(|client|
            MemoryChat::new(Arc::clone(&store), Arc::new(client), options)
        );
        self.store = Some(store);
        self
    }

    pub async fn initialize(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let timeout = Duration::from_secs(args.request_timeout_secs);
        let mut state = AppState::new(ModelSettings::from_args(args));

        let anthropic_config = LlmConfig::new(
            LlmType::Anthropic,
            &args.anthropic_api_key,
            args.anthropic_base_url.clone(),
            timeout
        );
        if let Some(client) = build_client(&anthropic_config, AnthropicChatClient::from_config)? {
            state = state.with_anthropic(client);
        }

        let gemini_config = LlmConfig::new(
            LlmType::Gemini,
            &args.google_api_key,
            args.gemini_base_url.clone(),
            timeout
        );
        if let Some(client) = build_client(&gemini_config, GeminiChatClient::from_config)? {
            state = state.with_gemini(client);
        }

        let openai_config = LlmConfig::new(
            LlmType::OpenAI,
            &args.openai_api_key,
            args.openai_base_url.clone(),
            timeout
        );
        let openai = build_client(&openai_config, OpenAiChatClient::from_config)?;

        match create_history_store(args)? {
            Some(store) => {
                if openai.is_none() {
                    warn!("Conversation memory is enabled but OpenAI is not; memory chat will answer 503.");
                }
                let options = OpenAiOptions {
                    model: args.openai_chat_model.clone(),
                    max_completion_tokens: args.openai_max_tokens,
                };
                state = state.with_memory(store, openai, options);
            }
            None => info!("Conversation memory routes are disabled."),
        }

        Ok(state)
    }

    pub fn anthropic(&self) -> Result<&AnthropicChatClient, ApiError> {
        self.anthropic.as_deref().ok_or_else(|| ApiError::NotConfigured(LlmType::Anthropic.to_string()))
    }

    pub fn gemini(&self) -> Result<&GeminiChatClient, ApiError> {
        self.gemini.as_deref().ok_or_else(|| ApiError::NotConfigured(LlmType::Gemini.to_string()))
    }

    pub fn store(&self) -> Result<&Arc<dyn ConversationStore>, ApiError> {
        self.store.as_ref().ok_or_else(|| ApiError::NotConfigured("Conversation memory".into()))
    }

    pub fn memory_chat(&self) -> Result<&MemoryChat<OpenAiChatClient>, ApiError> {
        self.store()?;
        self.memory_chat.as_ref().ok_or_else(|| ApiError::NotConfigured(LlmType::OpenAI.to_string()))
    }
}

fn build_client<C>(
    config: &LlmConfig,
    build: fn(&LlmConfig) -> Result<C, Box<dyn Error + Send + Sync>>
) -> Result<Option<C>, Box<dyn Error + Send + Sync>> {
    if !config.is_configured() {
        warn!("{} API key not set; its routes will answer 503.", config.llm_type);
        return Ok(None);
    }
    let client = build(config)?;
    info!(
        "{} client configured: BaseURL={}",
        config.llm_type,
        config.base_url.as_deref().unwrap_or("adapter default")
    );
    Ok(Some(client))
}

/// Added to the router timeout so the provider client's own timeout fires first and
/// the caller gets a 504 with an error body.
pub const ROUTER_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

pub fn router(state: AppState, request_timeout: Duration) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_handler))
        .merge(anthropic_routes::routes())
        .merge(google::routes())
        .merge(memory::routes())
        .layer(TimeoutLayer::new(request_timeout + ROUTER_TIMEOUT_MARGIN))
        .layer(cors)
        .with_state(state)
}

pub async fn start_http_server(
    addr: &str,
    state: AppState,
    args: &Args
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let addr = addr.parse::<SocketAddr>().map_err(|e| format!("Invalid server address '{}': {}", addr, e))?;
    let app = router(state, Duration::from_secs(args.request_timeout_secs));

    if args.enable_tls && args.tls_paths().is_none() {
        return Err("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.".into());
    }

    if let Some((cert_path, key_path)) = args.tls_paths() {
        info!("TLS enabled. Loading certificate from '{}' and key from '{}'", cert_path, key_path);
        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;
        info!("HTTPS server listening on: https://{}", addr);
        axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
    } else {
        let listener = tokio::net::TcpListener
            ::bind(addr).await
            .map_err(|e| format!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e))?;
        info!("HTTP server listening on: http://{}", addr);
        axum::serve(listener, app.into_make_service()).with_graceful_shutdown(shutdown_signal()).await?;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining connections");
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        memory_enabled: state.store.is_some(),
    })
}
