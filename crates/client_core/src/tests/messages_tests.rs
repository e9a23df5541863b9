use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;

use super::*;
use crate::{
    cache::apply_message_create,
    error::ClientError,
    test_support::{ids, message, page},
};

#[derive(Clone, Default)]
struct Seen {
    queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

async fn history(
    State(seen): State<Seen>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<MessagePage>, StatusCode> {
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer secret") {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let cursor = query.get("cursor").cloned();
    seen.queries.lock().expect("lock").push(query);
    Ok(Json(match cursor.as_deref() {
        None => page(&["c", "b"], Some("b")),
        Some("b") => page(&["a"], None),
        Some(_) => MessagePage::default(),
    }))
}

async fn login(Json(req): Json<LoginRequest>) -> Json<LoginResponse> {
    assert_eq!(req.user_id, "user_1");
    Json(LoginResponse {
        profile_id: shared::domain::ProfileId::from("p1"),
        token: "secret".to_string(),
    })
}

async fn spawn_server() -> (String, Seen) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let seen = Seen::default();
    let app = Router::new()
        .route("/api/messages", get(history))
        .route("/login", post(login))
        .with_state(seen.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), seen)
}

#[tokio::test]
async fn fetch_page_sends_param_cursor_and_token() {
    let (url, seen) = spawn_server().await;
    let client = MessagesClient::new(url).with_token("secret");

    let first = client
        .fetch_page("/api/messages", "channelId", "c1", None)
        .await
        .expect("first page");
    assert_eq!(ids(&first), vec!["c", "b"]);

    let cursor = first.next_cursor.clone();
    let second = client
        .fetch_page("/api/messages", "channelId", "c1", cursor.as_ref())
        .await
        .expect("second page");
    assert_eq!(ids(&second), vec!["a"]);

    let queries = seen.queries.lock().expect("lock");
    assert_eq!(queries[0].get("channelId").map(String::as_str), Some("c1"));
    assert!(queries[0].get("cursor").is_none());
    assert_eq!(queries[1].get("cursor").map(String::as_str), Some("b"));
}

#[tokio::test]
async fn fetch_page_without_token_surfaces_http_error() {
    let (url, _) = spawn_server().await;
    let client = MessagesClient::new(url);
    let err = client
        .fetch_page("/api/messages", "channelId", "c1", None)
        .await
        .expect_err("unauthorized");
    assert!(matches!(err, ClientError::Http(_)));
}

#[tokio::test]
async fn load_next_page_walks_history_into_cache() {
    let (url, _) = spawn_server().await;
    let mut client = MessagesClient::new(format!("{url}/"));
    client.login("user_1", "alice").await.expect("login");
    let cache = QueryCache::new();

    let more = client
        .load_next_page(&cache, "chat:c1", "/api/messages", "channelId", "c1")
        .await
        .expect("first");
    assert!(more);
    let more = client
        .load_next_page(&cache, "chat:c1", "/api/messages", "channelId", "c1")
        .await
        .expect("second");
    assert!(!more);
    let more = client
        .load_next_page(&cache, "chat:c1", "/api/messages", "channelId", "c1")
        .await
        .expect("exhausted");
    assert!(!more);

    let cached = cache.get_query_data("chat:c1").expect("entry");
    assert_eq!(cached.pages.len(), 2);
    assert_eq!(cached.message_count(), 3);

    client
        .refresh(&cache, "chat:c1", "/api/messages", "channelId", "c1")
        .await
        .expect("refresh");
    assert_eq!(cache.get_query_data("chat:c1").expect("entry").pages.len(), 1);
}

#[tokio::test]
async fn load_next_page_fetches_history_behind_socket_seeded_entry() {
    let (url, seen) = spawn_server().await;
    let client = MessagesClient::new(url).with_token("secret");
    let cache = QueryCache::new();
    cache.set_query_data("chat:c1", |old| apply_message_create(old, &message("new", "live")));

    let more = client
        .load_next_page(&cache, "chat:c1", "/api/messages", "channelId", "c1")
        .await
        .expect("first");
    assert!(more);
    {
        let queries = seen.queries.lock().expect("lock");
        assert_eq!(queries.len(), 1);
        assert!(queries[0].get("cursor").is_none());
    }
    let cached = cache.get_query_data("chat:c1").expect("entry");
    assert_eq!(ids(&cached.pages[0]), vec!["new", "c", "b"]);

    let more = client
        .load_next_page(&cache, "chat:c1", "/api/messages", "channelId", "c1")
        .await
        .expect("second");
    assert!(!more);
    assert_eq!(seen.queries.lock().expect("lock").len(), 2);
    assert_eq!(cache.get_query_data("chat:c1").expect("entry").message_count(), 4);
}
