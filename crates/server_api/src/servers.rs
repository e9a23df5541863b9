use shared::{
    domain::{MemberRole, Profile, Server},
    error::ApiError,
    protocol::CreateServerRequest,
};
use tracing::info;

use crate::{require_profile, ApiContext};

pub async fn create_server(
    ctx: &ApiContext,
    profile: Option<&Profile>,
    req: CreateServerRequest,
) -> Result<Server, ApiError> {
    let profile = require_profile(profile)?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("server name missing"));
    }

    let (server, channel) = ctx
        .storage
        .create_server(&profile.id, name, req.image_url.as_deref().unwrap_or_default())
        .await
        .map_err(ApiError::internal)?;
    info!(server_id = %server.id, channel_id = %channel.id, "server created");
    Ok(server)
}

/// Joins the server behind `invite_code`. Joining twice is a no-op.
pub async fn join_server(
    ctx: &ApiContext,
    profile: Option<&Profile>,
    invite_code: &str,
) -> Result<Server, ApiError> {
    let profile = require_profile(profile)?;
    let server = ctx
        .storage
        .server_by_invite(invite_code)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found("server"))?;

    ctx.storage
        .add_member(&server.id, &profile.id, MemberRole::Guest)
        .await
        .map_err(ApiError::internal)?;
    info!(server_id = %server.id, profile_id = %profile.id, "member joined");
    Ok(server)
}

#[cfg(test)]
#[path = "tests/servers_tests.rs"]
mod tests;
