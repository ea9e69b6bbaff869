use std::sync::Arc;
use log::debug;
use thiserror::Error;

use crate::history::{ ConversationStore, StoreError };
use crate::llm::{ ChatProvider, ChatReply, ProviderError };
use crate::models::chat::ChatMessage;

#[derive(Debug, Error)]
pub enum MemoryChatError {
    #[error(transparent)] Store(#[from] StoreError),
    #[error(transparent)] Provider(#[from] ProviderError),
}

/// Chat that remembers: replays the stored window to the provider and records the new turn.
pub struct MemoryChat<P: ChatProvider> {
    store: Arc<dyn ConversationStore>,
    provider: Arc<P>,
    options: Arc<P::Options>,
}

impl<P: ChatProvider> Clone for MemoryChat<P> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            provider: Arc::clone(&self.provider),
            options: Arc::clone(&self.options),
        }
    }
}

impl<P: ChatProvider> MemoryChat<P> {
    pub fn new(store: Arc<dyn ConversationStore>, provider: Arc<P>, options: P::Options) -> Self {
        Self {
            store,
            provider,
            options: Arc::new(options),
        }
    }

    /// The prompt holds at most the store's window, the new user message included.
    /// Nothing is stored unless the provider answers; the turn is then stored as one write.
    pub async fn chat(
        &self,
        conversation_id: &str,
        message: &str
    ) -> Result<ChatReply<P::Metadata>, MemoryChatError> {
        let history_len = self.store.max_messages().saturating_sub(1);
        let history = self.store.load_window(conversation_id, history_len).await?;
        debug!("Conversation {}: replaying {} messages", conversation_id, history.len());

        let reply = self.provider.send(&history, message, &*self.options).await?;

        let turn = [ChatMessage::user(message), ChatMessage::assistant(reply.text.clone())];
        self.store.append_all(conversation_id, &turn).await?;
        Ok(reply)
    }
}
