use async_trait::async_trait;
use std::collections::{ HashMap, VecDeque };
use tokio::sync::RwLock;

use crate::history::{ ConversationStore, StoreError };
use crate::models::chat::ChatMessage;

/// Process-local store with the same windowing as the Redis one.
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, VecDeque<ChatMessage>>>,
    max_messages: usize,
}

impl InMemoryConversationStore {
    pub fn new(max_messages: usize) -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            max_messages,
        }
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn append_all(&self, conversation_id: &str, messages: &[ChatMessage]) -> Result<(), StoreError> {
        if messages.is_empty() {
            return Ok(());
        }
        let mut conversations = self.conversations.write().await;
        let stored = conversations.entry(conversation_id.to_string()).or_default();
        stored.extend(messages.iter().cloned());
        while stored.len() > self.max_messages {
            stored.pop_front();
        }
        Ok(())
    }

    async fn load_window(
        &self,
        conversation_id: &str,
        max_messages: usize
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let conversations = self.conversations.read().await;
        let Some(messages) = conversations.get(conversation_id) else {
            return Ok(Vec::new());
        };
        let skip = messages.len().saturating_sub(max_messages);
        Ok(messages.iter().skip(skip).cloned().collect())
    }

    async fn list_conversation_ids(&self) -> Result<Vec<String>, StoreError> {
        let conversations = self.conversations.read().await;
        let mut ids: Vec<String> = conversations.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn delete(&self, conversation_id: &str) -> Result<(), StoreError> {
        self.conversations.write().await.remove(conversation_id);
        Ok(())
    }

    fn max_messages(&self) -> usize {
        self.max_messages
    }
}
