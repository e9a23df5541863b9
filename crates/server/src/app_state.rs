use server_api::ApiContext;
use shared::{domain::ServerId, events::SocketEnvelope};
use tokio::sync::broadcast;

/// A socket frame plus the server whose members may receive it.
#[derive(Debug, Clone)]
pub(crate) struct ChannelEvent {
    pub(crate) server_id: ServerId,
    pub(crate) envelope: SocketEnvelope,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    pub(crate) events: broadcast::Sender<ChannelEvent>,
    pub(crate) jwt_secret: String,
    pub(crate) token_ttl_seconds: i64,
}
