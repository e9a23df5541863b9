use std::{collections::HashSet, sync::Arc};

use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use server_api::{
    create_server, delete_message, edit_message, join_server, list_messages,
    resolve_channel_page, send_message, ChannelRouteParams, MessageEvent, PageOutcome,
};
use shared::{
    domain::{ChannelId, MessageId, MessageWithMember, Profile, Server, ServerId},
    error::{ApiError, ErrorCode},
    events::SocketEnvelope,
    protocol::{
        ChannelQuery, CreateServerRequest, EditMessageRequest, LoginRequest, LoginResponse,
        MessagePage, SendMessageRequest,
    },
};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{debug, error, warn};

use crate::{
    app_state::{AppState, ChannelEvent},
    identity::{issue_token, CurrentProfile},
};

const MAX_BODY_BYTES: usize = 64 * 1024;

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMessagesQuery {
    channel_id: ChannelId,
    #[serde(default)]
    cursor: Option<MessageId>,
}

pub(crate) fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/login", post(login))
        .route("/servers", post(http_create_server))
        .route("/invite/:invite_code", post(http_join_server))
        .route(
            "/servers/:server_id/channels/:channel_id",
            get(channel_page),
        )
        .route("/api/messages", get(http_list_messages))
        .route("/api/socket/messages", post(http_send_message))
        .route(
            "/api/socket/messages/:message_id",
            patch(http_edit_message).delete(http_delete_message),
        )
        .route("/ws", get(ws_handler))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub(crate) fn error_response(err: ApiError) -> (StatusCode, Json<ApiError>) {
    let status = match err.code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => {
            error!(message = %err.message, "internal error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(err))
}

/// Announces a message change to the sockets of the message's server.
fn publish(state: &AppState, event: &MessageEvent) {
    let envelope = match SocketEnvelope::new(event.event.clone(), &event.message) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(%err, event = %event.event, "failed to encode socket event");
            return;
        }
    };
    let server_id = event.message.member.member.server_id.clone();
    // No subscribers is fine: nobody is watching.
    let receivers = state
        .events
        .send(ChannelEvent {
            server_id,
            envelope,
        })
        .unwrap_or(0);
    debug!(event = %event.event, receivers, "published socket event");
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, StatusCode> {
    state.api.storage.health_check().await.map_err(|err| {
        error!(%err, "health check failed");
        StatusCode::SERVICE_UNAVAILABLE
    })?;
    Ok("ok")
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    if req.user_id.trim().is_empty() || req.name.trim().is_empty() {
        return Err(error_response(ApiError::validation(
            "user id and name are required",
        )));
    }

    let profile = state
        .api
        .storage
        .upsert_profile(
            req.user_id.trim(),
            req.name.trim(),
            req.image_url.as_deref().unwrap_or_default(),
            req.email.as_deref().unwrap_or_default(),
        )
        .await
        .map_err(|e| error_response(ApiError::internal(e)))?;
    let token = issue_token(&state.jwt_secret, &profile.id, state.token_ttl_seconds)
        .map_err(|e| error_response(ApiError::internal(e)))?;

    Ok(Json(LoginResponse {
        profile_id: profile.id,
        token,
    }))
}

async fn http_create_server(
    State(state): State<Arc<AppState>>,
    CurrentProfile(profile): CurrentProfile,
    Json(req): Json<CreateServerRequest>,
) -> ApiResult<(StatusCode, Json<Server>)> {
    let server = create_server(&state.api, profile.as_ref(), req)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(server)))
}

async fn http_join_server(
    State(state): State<Arc<AppState>>,
    CurrentProfile(profile): CurrentProfile,
    Path(invite_code): Path<String>,
) -> ApiResult<Json<Server>> {
    let server = join_server(&state.api, profile.as_ref(), &invite_code)
        .await
        .map_err(error_response)?;
    Ok(Json(server))
}

async fn channel_page(
    State(state): State<Arc<AppState>>,
    CurrentProfile(profile): CurrentProfile,
    Path(params): Path<ChannelRouteParams>,
) -> ApiResult<Response> {
    let directory = state.api.directory();
    let outcome = resolve_channel_page(&directory, profile.as_ref(), &params)
        .await
        .map_err(error_response)?;

    Ok(match outcome {
        PageOutcome::Redirect { location } => Redirect::to(location).into_response(),
        PageOutcome::Render(view) => Json(view).into_response(),
    })
}

async fn http_list_messages(
    State(state): State<Arc<AppState>>,
    CurrentProfile(profile): CurrentProfile,
    Query(q): Query<ListMessagesQuery>,
) -> ApiResult<Json<MessagePage>> {
    let page = list_messages(&state.api, profile.as_ref(), &q.channel_id, q.cursor.as_ref())
        .await
        .map_err(error_response)?;
    Ok(Json(page))
}

async fn http_send_message(
    State(state): State<Arc<AppState>>,
    CurrentProfile(profile): CurrentProfile,
    Query(query): Query<ChannelQuery>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<Json<MessageWithMember>> {
    let event = send_message(&state.api, profile.as_ref(), &query, req)
        .await
        .map_err(error_response)?;
    publish(&state, &event);
    Ok(Json(event.message))
}

async fn http_edit_message(
    State(state): State<Arc<AppState>>,
    CurrentProfile(profile): CurrentProfile,
    Path(message_id): Path<MessageId>,
    Query(query): Query<ChannelQuery>,
    Json(req): Json<EditMessageRequest>,
) -> ApiResult<Json<MessageWithMember>> {
    let event = edit_message(&state.api, profile.as_ref(), &query, &message_id, req)
        .await
        .map_err(error_response)?;
    publish(&state, &event);
    Ok(Json(event.message))
}

async fn http_delete_message(
    State(state): State<Arc<AppState>>,
    CurrentProfile(profile): CurrentProfile,
    Path(message_id): Path<MessageId>,
    Query(query): Query<ChannelQuery>,
) -> ApiResult<Json<MessageWithMember>> {
    let event = delete_message(&state.api, profile.as_ref(), &query, &message_id)
        .await
        .map_err(error_response)?;
    publish(&state, &event);
    Ok(Json(event.message))
}

async fn ws_handler(
    State(state): State<Arc<AppState>>,
    CurrentProfile(profile): CurrentProfile,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(profile) = profile else {
        return error_response(ApiError::unauthorized()).into_response();
    };
    ws.on_upgrade(move |socket| ws_connection(state, profile, socket))
}

/// Forwards events to one socket, limited to servers the profile belongs to.
async fn ws_connection(
    state: Arc<AppState>,
    profile: Profile,
    socket: axum::extract::ws::WebSocket,
) {
    use axum::extract::ws::Message;
    use futures::{SinkExt, StreamExt};
    use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

    let (mut sender, mut receiver) = socket.split();
    let mut events = BroadcastStream::new(state.events.subscribe());
    debug!(profile_id = %profile.id, "socket subscribed");

    let send_state = Arc::clone(&state);
    let send_task = tokio::spawn(async move {
        let mut joined: HashSet<ServerId> = HashSet::new();
        while let Some(item) = events.next().await {
            let event = match item {
                Ok(event) => event,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, profile_id = %profile.id, "socket subscriber lagged");
                    continue;
                }
            };
            if !joined.contains(&event.server_id) {
                match send_state.api.storage.member(&event.server_id, &profile.id).await {
                    Ok(Some(_)) => {
                        joined.insert(event.server_id.clone());
                    }
                    Ok(None) => continue,
                    Err(err) => {
                        warn!(%err, server_id = %event.server_id, "membership lookup failed");
                        continue;
                    }
                }
            }
            let text = match serde_json::to_string(&event.envelope) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
    }

    send_task.abort();
}

#[cfg(test)]
#[path = "tests/routes_tests.rs"]
mod tests;
