use serde::{Deserialize, Serialize};

use crate::domain::{ChannelId, MessageId, MessageWithMember, ProfileId, ServerId};

/// Endpoint the composition input posts new messages to.
pub const SOCKET_MESSAGES_URL: &str = "/api/socket/messages";
/// Endpoint the message list pages history from.
pub const MESSAGES_URL: &str = "/api/messages";
/// Messages returned per history page.
pub const MESSAGES_BATCH: u32 = 10;
/// Content that replaces a deleted message.
pub const DELETED_MESSAGE_CONTENT: &str = "This message has been deleted.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatType {
    Channel,
}

/// Identifies the channel a message operation targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelQuery {
    pub channel_id: ChannelId,
    pub server_id: ServerId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHeaderProps {
    pub name: String,
    pub server_id: ServerId,
    #[serde(rename = "type")]
    pub chat_type: ChatType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatInputProps {
    pub name: String,
    #[serde(rename = "type")]
    pub chat_type: ChatType,
    pub api_url: String,
    pub query: ChannelQuery,
}

/// Everything a client needs to load and live-update the message list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessagesProps {
    pub name: String,
    pub chat_id: ChannelId,
    #[serde(rename = "type")]
    pub chat_type: ChatType,
    pub api_url: String,
    pub socket_url: String,
    pub socket_query: ChannelQuery,
    pub param_key: String,
    pub param_value: String,
    pub query_key: String,
    pub add_key: String,
    pub update_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelView {
    pub header: ChatHeaderProps,
    pub messages: ChatMessagesProps,
    pub input: ChatInputProps,
}

/// One page of channel history, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    pub items: Vec<MessageWithMember>,
    #[serde(default)]
    pub next_cursor: Option<MessageId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub file_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditMessageRequest {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub profile_id: ProfileId,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateServerRequest {
    pub name: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_props_use_camel_case_wire_names() {
        let props = ChatInputProps {
            name: "general".into(),
            chat_type: ChatType::Channel,
            api_url: SOCKET_MESSAGES_URL.into(),
            query: ChannelQuery {
                channel_id: ChannelId::from("c1"),
                server_id: ServerId::from("s1"),
            },
        };
        let json = serde_json::to_value(&props).expect("json");
        assert_eq!(json["type"], "channel");
        assert_eq!(json["apiUrl"], "/api/socket/messages");
        assert_eq!(json["query"]["channelId"], "c1");
        assert_eq!(json["query"]["serverId"], "s1");
    }
}
