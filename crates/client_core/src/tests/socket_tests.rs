use std::{sync::Mutex, time::Duration};

use axum::{
    extract::{ws::WebSocket, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::{net::TcpListener, sync::mpsc};

use super::*;

fn recording_listener(seen: Arc<Mutex<Vec<serde_json::Value>>>) -> Listener {
    Arc::new(move |payload| {
        seen.lock().expect("lock").push(payload.clone());
    })
}

#[test]
fn emit_reaches_only_listeners_of_that_event() {
    let bus = EventBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    bus.on("chat:c1:messages", recording_listener(Arc::clone(&seen)));

    bus.emit("chat:c2:messages", &serde_json::json!({ "id": "x" }));
    bus.emit("chat:c1:messages", &serde_json::json!({ "id": "y" }));

    let seen = seen.lock().expect("lock");
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0]["id"], "y");
}

#[test]
fn off_removes_only_the_given_listener() {
    let bus = EventBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let first = bus.on("evt", recording_listener(Arc::clone(&seen)));
    bus.on("evt", recording_listener(Arc::clone(&seen)));
    assert_eq!(bus.listener_count("evt"), 2);

    bus.off("evt", first);
    assert_eq!(bus.listener_count("evt"), 1);
    bus.emit("evt", &serde_json::Value::Null);
    assert_eq!(seen.lock().expect("lock").len(), 1);
}

#[test]
fn listeners_may_unsubscribe_while_handling() {
    let bus = Arc::new(EventBus::new());
    let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

    let inner_bus = Arc::clone(&bus);
    let inner_slot = Arc::clone(&slot);
    let id = bus.on(
        "once",
        Arc::new(move |_| {
            if let Some(id) = inner_slot.lock().expect("lock").take() {
                inner_bus.off("once", id);
            }
        }),
    );
    *slot.lock().expect("lock") = Some(id);

    bus.emit("once", &serde_json::Value::Null);
    assert_eq!(bus.listener_count("once"), 0);
}

#[test]
fn websocket_url_swaps_scheme_and_path() {
    assert_eq!(
        websocket_url("http://127.0.0.1:8443").expect("url").as_str(),
        "ws://127.0.0.1:8443/ws"
    );
    assert_eq!(
        websocket_url("https://chat.example.com/app?x=1")
            .expect("url")
            .as_str(),
        "wss://chat.example.com/ws"
    );
    assert!(matches!(
        websocket_url("ftp://chat.example.com"),
        Err(ClientError::InvalidUrl { .. })
    ));
}

async fn push_frames(mut socket: WebSocket) {
    use axum::extract::ws::Message;

    let envelope = SocketEnvelope {
        event: "chat:c1:messages".into(),
        payload: serde_json::json!({ "id": "m1" }),
    };
    let frame = serde_json::to_string(&envelope).expect("encode");
    if socket.send(Message::Text("not json".into())).await.is_err() {
        return;
    }
    // Repeat until the client hangs up so a late listener still sees one.
    for _ in 0..100 {
        if socket.send(Message::Text(frame.clone())).await.is_err() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

async fn ws_handler(headers: HeaderMap, ws: WebSocketUpgrade) -> Response {
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer secret") {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ws.on_upgrade(push_frames)
}

#[tokio::test]
async fn socket_client_emits_decoded_envelopes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let app = Router::new().route("/ws", get(ws_handler));
        let _ = axum::serve(listener, app).await;
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let server_url = format!("http://{addr}");
    assert!(matches!(
        SocketClient::connect(&server_url, None).await,
        Err(ClientError::WebSocket(_))
    ));
    let client = SocketClient::connect(&server_url, Some("secret"))
        .await
        .expect("connect");
    client.on(
        "chat:c1:messages",
        Arc::new(move |payload| {
            let _ = tx.send(payload.clone());
        }),
    );

    let payload = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timely event")
        .expect("event");
    assert_eq!(payload["id"], "m1");
    assert!(!client.is_closed());
}
