//! Real-time event naming shared by the server fan-out and client listeners.

use serde::{Deserialize, Serialize};

use crate::domain::ChannelId;

/// One frame on the `/ws` fan-out: a named event and its JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketEnvelope {
    pub event: String,
    pub payload: serde_json::Value,
}

impl SocketEnvelope {
    pub fn new<T: Serialize>(event: impl Into<String>, payload: &T) -> serde_json::Result<Self> {
        Ok(Self {
            event: event.into(),
            payload: serde_json::to_value(payload)?,
        })
    }
}

/// Query key of the cached message list for a chat.
pub fn chat_query_key(chat_id: &ChannelId) -> String {
    format!("chat:{chat_id}")
}

/// Event emitted when a message is created in a chat.
pub fn chat_add_key(chat_id: &ChannelId) -> String {
    format!("chat:{chat_id}:messages")
}

/// Event emitted when a message in a chat is edited or deleted.
pub fn chat_update_key(chat_id: &ChannelId) -> String {
    format!("chat:{chat_id}:messages:update")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_keys_are_scoped_by_channel() {
        let channel = ChannelId::from("c1");
        assert_eq!(chat_query_key(&channel), "chat:c1");
        assert_eq!(chat_add_key(&channel), "chat:c1:messages");
        assert_eq!(chat_update_key(&channel), "chat:c1:messages:update");
    }
}
