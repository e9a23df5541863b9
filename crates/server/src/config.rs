use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use config::{Config, Environment, File};
use serde::Deserialize;
use server_api::MembershipScope;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub token_ttl_seconds: i64,
    pub membership_scope: MembershipScope,
    pub event_buffer: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:3000".into(),
            database_url: "sqlite://./data/chat.db".into(),
            jwt_secret: "dev-secret-change-me".into(),
            token_ttl_seconds: 30 * 24 * 3600,
            membership_scope: MembershipScope::Server,
            event_buffer: 256,
        }
    }
}

/// Reads `server.toml` (optional) and `APP__*` environment variables on top
/// of the defaults. `DATABASE_URL` is honoured when `APP__DATABASE_URL` is
/// unset.
pub fn load_settings() -> anyhow::Result<Settings> {
    load_settings_from(Path::new("server.toml"))
}

pub fn load_settings_from(path: &Path) -> anyhow::Result<Settings> {
    let defaults = Settings::default();
    let legacy_database_url = std::env::var("DATABASE_URL")
        .ok()
        .filter(|_| std::env::var("APP__DATABASE_URL").is_err());

    let settings = Config::builder()
        .set_default("server_bind", defaults.server_bind)?
        .set_default("database_url", defaults.database_url)?
        .set_default("jwt_secret", defaults.jwt_secret)?
        .set_default("token_ttl_seconds", defaults.token_ttl_seconds)?
        .set_default("membership_scope", "server")?
        .set_default("event_buffer", defaults.event_buffer as i64)?
        .add_source(File::from(path).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true),
        )
        .set_override_option("database_url", legacy_database_url)?
        .build()
        .with_context(|| format!("failed to load settings from '{}'", path.display()))?
        .try_deserialize::<Settings>()
        .context("invalid settings")?;

    Ok(settings)
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
    let Some(parent) = sqlite_path(database_url).and_then(|p| p.parent().map(Path::to_path_buf))
    else {
        return Ok(());
    };

    fs::create_dir_all(&parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.contains(":memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(PathBuf::from(path))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
