use shared::{
    domain::{ChannelId, MessageId, MessageWithMember, Profile},
    error::{ApiError, ErrorCode},
    events::{chat_add_key, chat_update_key},
    protocol::{
        ChannelQuery, EditMessageRequest, MessagePage, SendMessageRequest,
        DELETED_MESSAGE_CONTENT, MESSAGES_BATCH,
    },
};
use tracing::info;

use crate::{ensure_member, require_profile, ApiContext};

/// A stored message plus the real-time event it must be announced on.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub event: String,
    pub message: MessageWithMember,
}

pub async fn send_message(
    ctx: &ApiContext,
    profile: Option<&Profile>,
    query: &ChannelQuery,
    req: SendMessageRequest,
) -> Result<MessageEvent, ApiError> {
    let profile = require_profile(profile)?;
    let content = req.content.trim();
    if content.is_empty() {
        return Err(ApiError::validation("content missing"));
    }

    let member = ensure_member(ctx, &query.server_id, profile).await?;
    let channel = ctx
        .storage
        .channel(&query.channel_id)
        .await
        .map_err(ApiError::internal)?
        .filter(|channel| channel.server_id == query.server_id)
        .ok_or_else(|| ApiError::not_found("channel"))?;

    let file_url = req.file_url.as_deref().filter(|url| !url.trim().is_empty());
    let message = ctx
        .storage
        .insert_message(&channel.id, &member.id, content, file_url)
        .await
        .map_err(ApiError::internal)?;
    info!(message_id = %message.id, channel_id = %channel.id, "message created");

    Ok(MessageEvent {
        event: chat_add_key(&channel.id),
        message,
    })
}

/// Only the author may edit a message.
pub async fn edit_message(
    ctx: &ApiContext,
    profile: Option<&Profile>,
    query: &ChannelQuery,
    message_id: &MessageId,
    req: EditMessageRequest,
) -> Result<MessageEvent, ApiError> {
    let content = req.content.trim();
    if content.is_empty() {
        return Err(ApiError::validation("content missing"));
    }

    let change = authorize_change(ctx, profile, query, message_id).await?;
    if !change.is_author {
        return Err(ApiError::new(
            ErrorCode::Forbidden,
            "only the author may edit a message",
        ));
    }

    let message = ctx
        .storage
        .update_message_content(message_id, content)
        .await
        .map_err(ApiError::internal)?;
    info!(message_id = %message.id, "message edited");

    Ok(MessageEvent {
        event: chat_update_key(&query.channel_id),
        message,
    })
}

/// The author, an admin or a moderator may delete a message.
pub async fn delete_message(
    ctx: &ApiContext,
    profile: Option<&Profile>,
    query: &ChannelQuery,
    message_id: &MessageId,
) -> Result<MessageEvent, ApiError> {
    let change = authorize_change(ctx, profile, query, message_id).await?;
    if !change.is_author && !change.is_moderator {
        return Err(ApiError::new(
            ErrorCode::Forbidden,
            "only the author or a moderator may delete a message",
        ));
    }

    let message = ctx
        .storage
        .mark_message_deleted(message_id, DELETED_MESSAGE_CONTENT)
        .await
        .map_err(ApiError::internal)?;
    info!(message_id = %message.id, "message deleted");

    Ok(MessageEvent {
        event: chat_update_key(&query.channel_id),
        message,
    })
}

pub async fn list_messages(
    ctx: &ApiContext,
    profile: Option<&Profile>,
    channel_id: &ChannelId,
    cursor: Option<&MessageId>,
) -> Result<MessagePage, ApiError> {
    let profile = require_profile(profile)?;
    let channel = ctx
        .storage
        .channel(channel_id)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found("channel"))?;
    ensure_member(ctx, &channel.server_id, profile).await?;

    let items = ctx
        .storage
        .list_channel_messages(channel_id, MESSAGES_BATCH, cursor)
        .await
        .map_err(ApiError::internal)?;
    let next_cursor = if items.len() == MESSAGES_BATCH as usize {
        items.last().map(|message| message.id.clone())
    } else {
        None
    };

    Ok(MessagePage { items, next_cursor })
}

struct Change {
    is_author: bool,
    is_moderator: bool,
}

async fn authorize_change(
    ctx: &ApiContext,
    profile: Option<&Profile>,
    query: &ChannelQuery,
    message_id: &MessageId,
) -> Result<Change, ApiError> {
    let profile = require_profile(profile)?;
    let member = ensure_member(ctx, &query.server_id, profile).await?;
    ctx.storage
        .channel(&query.channel_id)
        .await
        .map_err(ApiError::internal)?
        .filter(|channel| channel.server_id == query.server_id)
        .ok_or_else(|| ApiError::not_found("channel"))?;

    let message = ctx
        .storage
        .message_in_channel(message_id, &query.channel_id)
        .await
        .map_err(ApiError::internal)?
        .filter(|message| !message.deleted)
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "message not found"))?;

    Ok(Change {
        is_author: message.member_id == member.id,
        is_moderator: member.role.can_moderate(),
    })
}

#[cfg(test)]
#[path = "tests/messages_tests.rs"]
mod tests;
