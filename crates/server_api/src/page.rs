use serde::Deserialize;
use shared::{
    domain::{Channel, ChannelId, Profile, ServerId},
    error::ApiError,
    events::{chat_add_key, chat_query_key, chat_update_key},
    protocol::{
        ChannelQuery, ChannelView, ChatHeaderProps, ChatInputProps, ChatMessagesProps, ChatType,
        MESSAGES_URL, SOCKET_MESSAGES_URL,
    },
};
use tracing::debug;

use crate::directory::ChannelDirectory;

pub const ROOT_ROUTE: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelRouteParams {
    pub server_id: ServerId,
    pub channel_id: ChannelId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Redirect { location: &'static str },
    Render(ChannelView),
}

impl PageOutcome {
    fn to_root() -> Self {
        Self::Redirect {
            location: ROOT_ROUTE,
        }
    }
}

/// Gates the channel page on identity and membership.
///
/// Without a profile the page redirects before touching the directory. A
/// missing channel or membership also redirects; only lookup faults surface
/// as errors.
pub async fn resolve_channel_page(
    directory: &dyn ChannelDirectory,
    profile: Option<&Profile>,
    params: &ChannelRouteParams,
) -> Result<PageOutcome, ApiError> {
    let Some(profile) = profile else {
        debug!(server_id = %params.server_id, channel_id = %params.channel_id, "no profile, redirecting");
        return Ok(PageOutcome::to_root());
    };

    let channel = directory
        .find_channel(&params.channel_id)
        .await
        .map_err(ApiError::internal)?;
    let is_member = directory
        .has_membership(&params.server_id, &profile.id)
        .await
        .map_err(ApiError::internal)?;

    let Some(channel) = channel.filter(|_| is_member) else {
        debug!(
            server_id = %params.server_id,
            channel_id = %params.channel_id,
            profile_id = %profile.id,
            is_member,
            "channel or membership missing, redirecting"
        );
        return Ok(PageOutcome::to_root());
    };

    Ok(PageOutcome::Render(channel_view(&channel)))
}

fn channel_view(channel: &Channel) -> ChannelView {
    let query = ChannelQuery {
        channel_id: channel.id.clone(),
        server_id: channel.server_id.clone(),
    };

    ChannelView {
        header: ChatHeaderProps {
            name: channel.name.clone(),
            server_id: channel.server_id.clone(),
            chat_type: ChatType::Channel,
        },
        messages: ChatMessagesProps {
            name: channel.name.clone(),
            chat_id: channel.id.clone(),
            chat_type: ChatType::Channel,
            api_url: MESSAGES_URL.to_string(),
            socket_url: SOCKET_MESSAGES_URL.to_string(),
            socket_query: query.clone(),
            param_key: "channelId".to_string(),
            param_value: channel.id.to_string(),
            query_key: chat_query_key(&channel.id),
            add_key: chat_add_key(&channel.id),
            update_key: chat_update_key(&channel.id),
        },
        input: ChatInputProps {
            name: channel.name.clone(),
            chat_type: ChatType::Channel,
            api_url: SOCKET_MESSAGES_URL.to_string(),
            query,
        },
    }
}

#[cfg(test)]
#[path = "tests/page_tests.rs"]
mod tests;
