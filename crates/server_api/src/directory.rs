use async_trait::async_trait;
use shared::domain::{Channel, ChannelId, ProfileId, ServerId};
use storage::Storage;

use crate::MembershipScope;

/// Lookups the channel page needs before it renders.
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    async fn find_channel(&self, channel_id: &ChannelId) -> anyhow::Result<Option<Channel>>;

    async fn has_membership(
        &self,
        server_id: &ServerId,
        profile_id: &ProfileId,
    ) -> anyhow::Result<bool>;
}

#[derive(Clone)]
pub struct StorageDirectory {
    storage: Storage,
    scope: MembershipScope,
}

impl StorageDirectory {
    pub fn new(storage: Storage, scope: MembershipScope) -> Self {
        Self { storage, scope }
    }
}

#[async_trait]
impl ChannelDirectory for StorageDirectory {
    async fn find_channel(&self, channel_id: &ChannelId) -> anyhow::Result<Option<Channel>> {
        self.storage.channel(channel_id).await
    }

    async fn has_membership(
        &self,
        server_id: &ServerId,
        profile_id: &ProfileId,
    ) -> anyhow::Result<bool> {
        match self.scope {
            MembershipScope::Server => Ok(self.storage.member(server_id, profile_id).await?.is_some()),
            MembershipScope::ChannelOwner => Ok(self
                .storage
                .channel_created_by(server_id, profile_id)
                .await?
                .is_some()),
        }
    }
}
