use serde::Deserialize;
use shared::{
    domain::{Member, Profile, ServerId},
    error::{ApiError, ErrorCode},
};
use storage::Storage;

pub mod directory;
pub mod messages;
pub mod page;
pub mod servers;

pub use directory::{ChannelDirectory, StorageDirectory};
pub use messages::{delete_message, edit_message, list_messages, send_message, MessageEvent};
pub use page::{resolve_channel_page, ChannelRouteParams, PageOutcome, ROOT_ROUTE};
pub use servers::{create_server, join_server};

/// Which relation the channel page treats as proof of membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipScope {
    /// A member row for the profile in the route's server.
    #[default]
    Server,
    /// Any channel in the route's server created by the profile.
    ChannelOwner,
}

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub membership_scope: MembershipScope,
}

impl ApiContext {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            membership_scope: MembershipScope::default(),
        }
    }

    pub fn directory(&self) -> StorageDirectory {
        StorageDirectory::new(self.storage.clone(), self.membership_scope)
    }
}

fn require_profile(profile: Option<&Profile>) -> Result<&Profile, ApiError> {
    profile.ok_or_else(ApiError::unauthorized)
}

async fn ensure_member(
    ctx: &ApiContext,
    server_id: &ServerId,
    profile: &Profile,
) -> Result<Member, ApiError> {
    ctx.storage
        .member(server_id, &profile.id)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::Forbidden, "user is not a member"))
}
