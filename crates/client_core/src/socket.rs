//! Named-event socket capability and its WebSocket-backed implementation.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, PoisonError, RwLock,
    },
};

use futures::StreamExt;
use shared::events::SocketEnvelope;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::{header::AUTHORIZATION, HeaderValue},
        Message,
    },
};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ClientError, Result};

pub type Listener = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Something that can register listeners for named events.
pub trait SocketHandle: Send + Sync {
    fn on(&self, event: &str, listener: Listener) -> ListenerId;
    fn off(&self, event: &str, id: ListenerId);
    fn listener_count(&self, event: &str) -> usize;
}

/// In-process listener registry.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<String, Vec<(ListenerId, Listener)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls every listener for `event`. The registry lock is released first
    /// so listeners may subscribe or unsubscribe.
    pub fn emit(&self, event: &str, payload: &serde_json::Value) {
        let targets: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map(|entries| entries.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        for listener in targets {
            listener(payload);
        }
    }
}

impl SocketHandle for EventBus {
    fn on(&self, event: &str, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.to_string())
            .or_default()
            .push((id, listener));
        id
    }

    fn off(&self, event: &str, id: ListenerId) {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entries) = listeners.get_mut(event) {
            entries.retain(|(existing, _)| *existing != id);
            if entries.is_empty() {
                listeners.remove(event);
            }
        }
    }

    fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map_or(0, Vec::len)
    }
}

/// A live `/ws` connection. Frames are decoded as [`SocketEnvelope`]s and
/// delivered in arrival order.
pub struct SocketClient {
    bus: Arc<EventBus>,
    reader: JoinHandle<()>,
}

impl SocketClient {
    /// Opens `/ws` on `server_url`, presenting `token` as a bearer token.
    pub async fn connect(server_url: &str, token: Option<&str>) -> Result<Self> {
        let ws_url = websocket_url(server_url)?;
        let mut request = ws_url.as_str().into_client_request()?;
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ClientError::InvalidToken)?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        let (ws_stream, _) = connect_async(request).await?;
        info!(url = %ws_url, "socket connected");
        let (_, mut ws_reader) = ws_stream.split();

        let bus = Arc::new(EventBus::new());
        let task_bus = Arc::clone(&bus);
        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<SocketEnvelope>(&text) {
                            Ok(envelope) => {
                                debug!(event = %envelope.event, "socket event");
                                task_bus.emit(&envelope.event, &envelope.payload);
                            }
                            Err(err) => warn!(%err, "invalid socket frame"),
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(%err, "socket read failed");
                        break;
                    }
                }
            }
            info!("socket closed");
        });

        Ok(Self { bus, reader })
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_finished()
    }
}

impl SocketHandle for SocketClient {
    fn on(&self, event: &str, listener: Listener) -> ListenerId {
        self.bus.on(event, listener)
    }

    fn off(&self, event: &str, id: ListenerId) {
        self.bus.off(event, id)
    }

    fn listener_count(&self, event: &str) -> usize {
        self.bus.listener_count(event)
    }
}

impl Drop for SocketClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

pub(crate) fn websocket_url(server_url: &str) -> Result<Url> {
    let invalid = |reason: &str| ClientError::InvalidUrl {
        url: server_url.to_string(),
        reason: reason.to_string(),
    };
    let mut url = Url::parse(server_url).map_err(|e| invalid(&e.to_string()))?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        _ => return Err(invalid("scheme must be http or https")),
    };
    url.set_scheme(scheme)
        .map_err(|_| invalid("scheme must be http or https"))?;
    url.set_path("/ws");
    url.set_query(None);
    Ok(url)
}

#[cfg(test)]
#[path = "tests/socket_tests.rs"]
mod tests;
