use super::*;

use std::{
    env,
    time::{SystemTime, UNIX_EPOCH},
};

fn temp_root(label: &str) -> PathBuf {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    env::temp_dir().join(format!("chat_server_{label}_{suffix}"))
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
}

#[test]
fn normalizes_single_colon_sqlite_url() {
    assert_eq!(
        normalize_database_url("sqlite:data\\test.db"),
        "sqlite://data/test.db"
    );
}

#[test]
fn keeps_memory_url_and_falls_back_for_blank() {
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
    assert_eq!(
        normalize_database_url("   "),
        Settings::default().database_url
    );
}

#[test]
fn creates_parent_dir_for_sqlite_url() {
    let root = temp_root("prepare");
    let db_path = root.join("data").join("test.db");

    prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare db url");
    assert!(root.join("data").exists());

    fs::remove_dir_all(root).expect("cleanup");
}

#[test]
fn missing_settings_file_yields_defaults() {
    let root = temp_root("missing");
    let settings = load_settings_from(&root.join("server.toml")).expect("settings");
    assert_eq!(settings.membership_scope, MembershipScope::Server);
    assert_eq!(settings.event_buffer, 256);
}

#[test]
fn settings_file_overrides_defaults() {
    let root = temp_root("file");
    fs::create_dir_all(&root).expect("root");
    let path = root.join("server.toml");
    fs::write(
        &path,
        "server_bind = \"0.0.0.0:9000\"\nmembership_scope = \"channel_owner\"\nevent_buffer = 8\n",
    )
    .expect("write");

    let settings = load_settings_from(&path).expect("settings");
    assert_eq!(settings.server_bind, "0.0.0.0:9000");
    assert_eq!(settings.membership_scope, MembershipScope::ChannelOwner);
    assert_eq!(settings.event_buffer, 8);

    fs::remove_dir_all(root).expect("cleanup");
}

#[tokio::test]
async fn prepared_database_url_creates_openable_sqlite_file() {
    let root = temp_root("open");
    let db_path = root.join("nested").join("server.db");

    let prepared = prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare");
    let storage = storage::Storage::new(&prepared).await.expect("open sqlite");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should be created: {}",
        db_path.display()
    );

    fs::remove_dir_all(root).expect("cleanup");
}
