pub mod models;
pub mod server;
pub mod llm;
pub mod cli;
pub mod history;

use cli::Args;
use log::info;
use server::api::AppState;
use server::Server;
use std::error::Error;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("llm-bridge v{}", env!("CARGO_PKG_VERSION"));
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Request Timeout: {}s", args.request_timeout_secs);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("Anthropic Configured: {}", !args.anthropic_api_key.trim().is_empty());
    info!("Anthropic Citations Model: {}", args.anthropic_citations_model);
    info!("Anthropic Skills Model: {}", args.anthropic_skills_model);
    info!("Gemini Configured: {}", !args.google_api_key.trim().is_empty());
    info!("Gemini Chat Model: {}", args.gemini_chat_model);
    info!("Gemini Thinking Model: {}", args.gemini_thinking_model);
    info!("OpenAI Configured: {}", !args.openai_api_key.trim().is_empty());
    info!("OpenAI Chat Model: {}", args.openai_chat_model);
    info!("History Store Type: {}", args.history_type);
    info!("History Max Messages: {}", args.history_max_messages);
    if args.history_ttl_secs > 0 {
        info!("History TTL: {}s", args.history_ttl_secs);
    }
    info!("-------------------------");

    let state = AppState::initialize(&args).await?;
    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, state, args);
    server.run().await?;

    Ok(())
}
