pub mod anthropic;
pub mod gemini;
pub mod openai;

use crate::models::chat::{ ChatMessage, MessageType };

/// Splits system messages out of a context, joining them in order.
///
/// Anthropic and Gemini take system text as a separate request field rather than as a turn.
pub(crate) fn split_system(context: &[ChatMessage]) -> (Option<String>, Vec<&ChatMessage>) {
    let mut system = Vec::new();
    let mut turns = Vec::new();
    for message in context {
        match message.message_type {
            MessageType::System => system.push(message.content.as_str()),
            _ => turns.push(message),
        }
    }
    let system = if system.is_empty() { None } else { Some(system.join("\n\n")) };
    (system, turns)
}
