mod chat;
mod memory;
mod redis;

pub use chat::{ MemoryChat, MemoryChatError };
pub use memory::InMemoryConversationStore;
pub use self::redis::RedisConversationStore;

use async_trait::async_trait;
use log::{ info, warn };
use std::error::Error;
use std::sync::Arc;
use thiserror::Error;

use crate::cli::Args;
use crate::models::chat::{ ChatMessage, Conversation };

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("conversation store error: {0}")] Redis(#[from] ::redis::RedisError),
    #[error("failed to encode message: {0}")] Serialization(#[from] serde_json::Error),
}

/// Persists ordered message lists per conversation, keeping only the newest `max_messages`.
///
/// Trimming happens on write: once a conversation holds `max_messages` entries, every
/// append permanently drops the oldest one.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Appends `messages` in order as one write, so a reader never sees part of the batch.
    async fn append_all(&self, conversation_id: &str, messages: &[ChatMessage]) -> Result<(), StoreError>;

    async fn append(&self, conversation_id: &str, message: ChatMessage) -> Result<(), StoreError> {
        self.append_all(conversation_id, std::slice::from_ref(&message)).await
    }

    /// The last `max_messages` messages, oldest first. Unknown ids yield an empty list.
    async fn load_window(
        &self,
        conversation_id: &str,
        max_messages: usize
    ) -> Result<Vec<ChatMessage>, StoreError>;

    async fn list_conversation_ids(&self) -> Result<Vec<String>, StoreError>;

    /// Removes every message of the conversation. Unknown ids are not an error.
    async fn delete(&self, conversation_id: &str) -> Result<(), StoreError>;

    fn max_messages(&self) -> usize;

    async fn get_conversation(&self, conversation_id: &str) -> Result<Conversation, StoreError> {
        let messages = self.load_window(conversation_id, self.max_messages()).await?;
        Ok(Conversation {
            id: conversation_id.to_string(),
            messages,
        })
    }
}

/// Builds the configured store, or `None` when conversation memory is switched off.
pub fn create_history_store(
    args: &Args
) -> Result<Option<Arc<dyn ConversationStore>>, Box<dyn Error + Send + Sync>> {
    if args.history_max_messages == 0 {
        return Err("HISTORY_MAX_MESSAGES must be at least 1".into());
    }

    match args.history_type.to_lowercase().as_str() {
        "redis" => {
            let host = match args.history_host.as_deref().map(str::trim) {
                Some(host) if !host.is_empty() => host,
                _ => {
                    warn!("No HISTORY_HOST configured; conversation memory is disabled.");
                    return Ok(None);
                }
            };
            let store = RedisConversationStore::new(
                host,
                args.history_redis_prefix.clone(),
                args.history_redis_scan_count,
                args.history_max_messages
            )?.with_ttl(args.history_ttl_secs);
            info!(
                "Conversation memory stored in Redis (prefix '{}', window {})",
                args.history_redis_prefix,
                args.history_max_messages
            );
            Ok(Some(Arc::new(store)))
        }
        "memory" => {
            info!(
                "Conversation memory kept in process (window {}); it is lost on restart.",
                args.history_max_messages
            );
            Ok(Some(Arc::new(InMemoryConversationStore::new(args.history_max_messages))))
        }
        _ =>
            Err(
                Box::new(
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!(
                            "Unsupported history store type: {} (expected redis or memory)",
                            args.history_type
                        )
                    )
                )
            ),
    }
}
