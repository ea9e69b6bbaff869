use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Server Args ---
    /// Host address and port for the HTTP server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:8080")]
    pub server_addr: String,

    /// Upper bound in seconds for a whole request, including the outbound provider call.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "120")]
    pub request_timeout_secs: u64,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,

    /// Optional path to the TLS certificate file (PEM format) for serving HTTPS. Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for serving HTTPS. Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    // --- Anthropic Args ---
    /// API key for Anthropic. The /api/anthropic routes answer 503 when empty.
    #[arg(long, env = "ANTHROPIC_API_KEY", default_value = "", hide_env_values = true)]
    pub anthropic_api_key: String,

    /// Base URL for the Anthropic API (defaults to https://api.anthropic.com).
    #[arg(long, env = "ANTHROPIC_BASE_URL")]
    pub anthropic_base_url: Option<String>,

    /// Model used to answer questions with citations.
    #[arg(long, env = "ANTHROPIC_CITATIONS_MODEL", default_value = "claude-opus-4-5")]
    pub anthropic_citations_model: String,

    /// Model used to generate documents with skills.
    #[arg(long, env = "ANTHROPIC_SKILLS_MODEL", default_value = "claude-sonnet-4-5")]
    pub anthropic_skills_model: String,

    #[arg(long, env = "ANTHROPIC_MAX_TOKENS", default_value = "4096")]
    pub anthropic_max_tokens: u32,

    /// Document generation needs a larger output budget than plain answers.
    #[arg(long, env = "ANTHROPIC_SKILLS_MAX_TOKENS", default_value = "16384")]
    pub anthropic_skills_max_tokens: u32,

    // --- Google Gemini Args ---
    /// API key for Google Gemini. The /api/google routes answer 503 when empty.
    #[arg(long, env = "GOOGLE_API_KEY", default_value = "", hide_env_values = true)]
    pub google_api_key: String,

    /// Base URL for the Gemini API (defaults to https://generativelanguage.googleapis.com).
    #[arg(long, env = "GEMINI_BASE_URL")]
    pub gemini_base_url: Option<String>,

    #[arg(long, env = "GEMINI_CHAT_MODEL", default_value = "gemini-2.0-flash")]
    pub gemini_chat_model: String,

    /// Model used by /api/google/chat/think; it must support thinking budgets.
    #[arg(long, env = "GEMINI_THINKING_MODEL", default_value = "gemini-2.5-pro")]
    pub gemini_thinking_model: String,

    // --- OpenAI Args ---
    /// API key for OpenAI, which answers the conversation-memory chat.
    #[arg(long, env = "OPENAI_API_KEY", default_value = "", hide_env_values = true)]
    pub openai_api_key: String,

    /// Base URL for the OpenAI API (defaults to https://api.openai.com).
    #[arg(long, env = "OPENAI_BASE_URL")]
    pub openai_base_url: Option<String>,

    #[arg(long, env = "OPENAI_CHAT_MODEL", default_value = "gpt-4o-mini")]
    pub openai_chat_model: String,

    #[arg(long, env = "OPENAI_MAX_TOKENS")]
    pub openai_max_tokens: Option<u32>,

    // --- History Store Args ---
    /// History chat store type (redis, memory)
    #[arg(long, env = "HISTORY_TYPE", default_value = "redis")]
    pub history_type: String,

    /// History chat store host endpoint (e.g., redis://127.0.0.1:6379). Conversation memory is off when unset.
    #[arg(long, env = "HISTORY_HOST", hide_env_values = true)]
    pub history_host: Option<String>,

    /// Prefix for Redis history keys.
    #[arg(long, env = "HISTORY_REDIS_PREFIX", default_value = "chat-memory:")]
    pub history_redis_prefix: String,

    /// Batch size for Redis SCAN command when listing conversations.
    #[arg(long, env = "HISTORY_REDIS_SCAN_COUNT", default_value = "100")]
    pub history_redis_scan_count: usize,

    /// Messages kept per conversation. Older ones are discarded on write.
    #[arg(long, env = "HISTORY_MAX_MESSAGES", default_value = "20")]
    pub history_max_messages: usize,

    /// Seconds a conversation lives after its last message. 0 means no expiry.
    #[arg(long, env = "HISTORY_TTL_SECS", default_value = "0")]
    pub history_ttl_secs: u64,
}

impl Args {
    pub fn tls_paths(&self) -> Option<(&str, &str)> {
        if !self.enable_tls {
            return None;
        }
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) => Some((cert.as_str(), key.as_str())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let args = Args::parse_from(["llm-bridge"]);
        assert_eq!(args.history_max_messages, 20);
        assert_eq!(args.anthropic_skills_max_tokens, 16384);
        assert_eq!(args.gemini_thinking_model, "gemini-2.5-pro");
        assert_eq!(args.request_timeout_secs, 120);
    }

    #[test]
    fn tls_requires_flag_and_both_paths() {
        let args = Args::parse_from(["llm-bridge", "--tls-cert-path", "c.pem", "--tls-key-path", "k.pem"]);
        assert!(args.tls_paths().is_none());

        let args = Args::parse_from(["llm-bridge", "--enable-tls", "--tls-cert-path", "c.pem"]);
        assert!(args.tls_paths().is_none());

        let args = Args::parse_from([
            "llm-bridge",
            "--enable-tls",
            "--tls-cert-path",
            "c.pem",
            "--tls-key-path",
            "k.pem",
        ]);
        assert_eq!(args.tls_paths(), Some(("c.pem", "k.pem")));
    }
}
