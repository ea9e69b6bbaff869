use async_trait::async_trait;
use crate::models::chat::ChatMessage;
use crate::history::{ ConversationStore, StoreError };
use log::{ debug, error };
use redis::{ Client, AsyncCommands };
use std::collections::BTreeSet;

/// One Redis list per conversation, newest message at the tail.
pub struct RedisConversationStore {
    client: Client,
    key_prefix: String,
    scan_count: usize,
    max_messages: usize,
    ttl_secs: u64,
}

impl RedisConversationStore {
    pub fn new(
        host: &str,
        key_prefix: impl Into<String>,
        scan_count: usize,
        max_messages: usize
    ) -> Result<Self, StoreError> {
        Ok(Self {
            client: Client::open(host)?,
            key_prefix: key_prefix.into(),
            scan_count: scan_count.max(1),
            max_messages,
            ttl_secs: 0,
        })
    }

    /// Expire a conversation `ttl_secs` after its last append. Zero keeps it forever.
    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    fn key(&self, conversation_id: &str) -> String {
        format!("{}{}", self.key_prefix, conversation_id)
    }

    fn conversation_id<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.key_prefix.as_str()).filter(|id| !id.is_empty())
    }

    /// `MULTI; RPUSH key m..; LTRIM key -max -1; [EXPIRE key ttl]; EXEC`
    fn append_pipeline(&self, key: &str, json_msgs: &[String]) -> redis::Pipeline {
        let mut pipe = redis::pipe();
        pipe.atomic()
            .rpush(key, json_msgs)
            .ignore()
            .ltrim(key, -(self.max_messages as isize), -1)
            .ignore();
        if self.ttl_secs > 0 {
            pipe.cmd("EXPIRE").arg(key).arg(self.ttl_secs).ignore();
        }
        pipe
    }

    fn scan_command(&self, cursor: u64) -> redis::Cmd {
        let mut cmd = redis::cmd("SCAN");
        cmd.arg(cursor)
            .arg("MATCH")
            .arg(format!("{}*", self.key_prefix))
            .arg("COUNT")
            .arg(self.scan_count);
        cmd
    }
}

#[async_trait]
impl ConversationStore for RedisConversationStore {
    async fn append_all(&self, conversation_id: &str, messages: &[ChatMessage]) -> Result<(), StoreError> {
        if messages.is_empty() {
            return Ok(());
        }
        let json_msgs = messages
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        let key = self.key(conversation_id);
        let mut conn = self.get_connection().await?;

        self.append_pipeline(&key, &json_msgs).query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn load_window(
        &self,
        conversation_id: &str,
        max_messages: usize
    ) -> Result<Vec<ChatMessage>, StoreError> {
        if max_messages == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.get_connection().await?;
        let key = self.key(conversation_id);
        let json_entries: Vec<String> = conn.lrange(&key, -(max_messages as isize), -1).await?;

        let mut messages = Vec::with_capacity(json_entries.len());
        for json_entry in &json_entries {
            match serde_json::from_str::<ChatMessage>(json_entry) {
                Ok(msg) => messages.push(msg),
                Err(e) => {
                    error!("Error parsing history entry for {}: {}", conversation_id, e);
                }
            }
        }
        Ok(messages)
    }

    async fn list_conversation_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut conn = self.get_connection().await?;
        let mut ids = BTreeSet::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = self.scan_command(cursor).query_async(&mut conn).await?;

            ids.extend(keys.iter().filter_map(|k| self.conversation_id(k)).map(str::to_string));
            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!("Found {} conversations under prefix '{}'", ids.len(), self.key_prefix);
        Ok(ids.into_iter().collect())
    }

    async fn delete(&self, conversation_id: &str) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let removed: i64 = conn.del(self.key(conversation_id)).await?;
        debug!("Deleted conversation {} ({} key)", conversation_id, removed);
        Ok(())
    }

    fn max_messages(&self) -> usize {
        self.max_messages
    }
}
