//! Keeps a chat's cached message list current from socket events.

use std::sync::Arc;

use serde::Deserialize;
use shared::domain::MessageWithMember;
use tracing::{debug, warn};

use crate::{
    cache::{apply_message_create, apply_message_update, InfiniteMessages, QueryCache},
    socket::{Listener, ListenerId, SocketHandle},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSocketConfig {
    pub add_key: String,
    pub update_key: String,
    pub query_key: String,
}

/// One installed pair of listeners. Dropping it unsubscribes both.
pub struct ChatSocket {
    socket: Arc<dyn SocketHandle>,
    config: ChatSocketConfig,
    add_listener: ListenerId,
    update_listener: ListenerId,
}

impl ChatSocket {
    /// Returns `None` without touching anything when there is no socket.
    pub fn subscribe(
        socket: Option<Arc<dyn SocketHandle>>,
        cache: QueryCache,
        config: ChatSocketConfig,
    ) -> Option<Self> {
        let socket = socket?;

        let update_listener = socket.on(
            &config.update_key,
            merge_listener(cache.clone(), config.query_key.clone(), apply_message_update),
        );
        let add_listener = socket.on(
            &config.add_key,
            merge_listener(cache, config.query_key.clone(), apply_message_create),
        );
        debug!(query_key = %config.query_key, "chat socket subscribed");

        Some(Self {
            socket,
            config,
            add_listener,
            update_listener,
        })
    }
}

impl Drop for ChatSocket {
    fn drop(&mut self) {
        self.socket.off(&self.config.add_key, self.add_listener);
        self.socket.off(&self.config.update_key, self.update_listener);
        debug!(query_key = %self.config.query_key, "chat socket unsubscribed");
    }
}

type Merge = fn(Option<&InfiniteMessages>, &MessageWithMember) -> Option<InfiniteMessages>;

fn merge_listener(cache: QueryCache, query_key: String, merge: Merge) -> Listener {
    Arc::new(move |payload: &serde_json::Value| {
        let message = match MessageWithMember::deserialize(payload) {
            Ok(message) => message,
            Err(err) => {
                warn!(%err, query_key = %query_key, "ignoring undecodable message payload");
                return;
            }
        };
        cache.set_query_data(&query_key, |old| merge(old, &message));
    })
}

/// Owns at most one [`ChatSocket`] and re-subscribes only when the socket
/// handle or the configuration changes.
#[derive(Default)]
pub struct ChatSocketBinding {
    cache: QueryCache,
    active: Option<ChatSocket>,
}

impl ChatSocketBinding {
    pub fn new(cache: QueryCache) -> Self {
        Self {
            cache,
            active: None,
        }
    }

    pub fn sync(&mut self, socket: Option<Arc<dyn SocketHandle>>, config: ChatSocketConfig) {
        let unchanged = match (&self.active, &socket) {
            (Some(active), Some(socket)) => {
                Arc::ptr_eq(&active.socket, socket) && active.config == config
            }
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }

        // Old listeners go before new ones are installed.
        self.active = None;
        self.active = ChatSocket::subscribe(socket, self.cache.clone(), config);
    }

    pub fn is_subscribed(&self) -> bool {
        self.active.is_some()
    }

    pub fn teardown(&mut self) {
        self.active = None;
    }
}

#[cfg(test)]
#[path = "tests/chat_socket_tests.rs"]
mod tests;
