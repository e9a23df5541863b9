use std::{net::SocketAddr, sync::Arc};

use server_api::ApiContext;
use storage::Storage;
use tokio::sync::broadcast;
use tracing::{error, info};

mod app_state;
mod config;
mod identity;
mod routes;

use app_state::AppState;
use config::{load_settings, prepare_database_url};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    let settings = load_settings()?;
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let api = ApiContext {
        storage,
        membership_scope: settings.membership_scope,
    };
    let (events, _) = broadcast::channel(settings.event_buffer.max(1));
    let state = AppState {
        api,
        events,
        jwt_secret: settings.jwt_secret,
        token_ttl_seconds: settings.token_ttl_seconds,
    };
    let app = routes::build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, membership_scope = ?settings.membership_scope, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
