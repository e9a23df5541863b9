use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("bearer token is not a valid header value")]
    InvalidToken,
    #[error("websocket connection failed: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
