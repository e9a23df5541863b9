//! Client side of channel chat: a paginated message cache kept current by
//! socket events, plus the HTTP and WebSocket plumbing that feeds it.

pub mod cache;
pub mod chat_socket;
pub mod error;
pub mod messages;
pub mod socket;

pub use cache::{apply_message_create, apply_message_update, InfiniteMessages, QueryCache};
pub use chat_socket::{ChatSocket, ChatSocketBinding, ChatSocketConfig};
pub use error::ClientError;
pub use messages::MessagesClient;
pub use socket::{EventBus, Listener, ListenerId, SocketClient, SocketHandle};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
