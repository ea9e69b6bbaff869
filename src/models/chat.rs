use chrono::Utc;
use serde::{ Deserialize, Serialize };
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    User,
    Assistant,
    System,
}

impl MessageType {
    /// Role name used by chat-completion style provider APIs.
    pub fn as_role(&self) -> &'static str {
        match self {
            MessageType::User => "user",
            MessageType::Assistant => "assistant",
            MessageType::System => "system",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::User => "USER",
            MessageType::Assistant => "ASSISTANT",
            MessageType::System => "SYSTEM",
        };
        write!(f, "{}", name)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub content: String,
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn new(message_type: MessageType, content: impl Into<String>) -> Self {
        Self {
            message_type,
            content: content.into(),
            timestamp: Utc::now().timestamp(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageType::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageType::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageType::System, content)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<ChatMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_serializes_uppercase() {
        let msg = ChatMessage::assistant("hello");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "ASSISTANT");
        assert_eq!(json["content"], "hello");

        let back: ChatMessage = serde_json::from_value(json).unwrap();
        assert_eq!(back.message_type, MessageType::Assistant);
    }

    #[test]
    fn roles_map_to_provider_names() {
        assert_eq!(MessageType::User.as_role(), "user");
        assert_eq!(MessageType::System.as_role(), "system");
        assert_eq!(MessageType::Assistant.to_string(), "ASSISTANT");
    }
}
