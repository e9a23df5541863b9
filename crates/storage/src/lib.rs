use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;
use uuid::Uuid;

use shared::domain::{
    Channel, ChannelId, ChannelKind, Member, MemberId, MemberRole, MemberWithProfile,
    MessageId, MessageWithMember, Profile, ProfileId, Server, ServerId,
};

const MESSAGE_SELECT: &str = "SELECT
        m.id AS message_id, m.content, m.file_url, m.member_id, m.channel_id, m.deleted,
        m.created_at, m.updated_at,
        mem.role, mem.profile_id, mem.server_id,
        p.user_id, p.name AS profile_name, p.image_url, p.email
     FROM messages m
     INNER JOIN members mem ON mem.id = m.member_id
     INNER JOIN profiles p ON p.id = mem.profile_id";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        // Every connection to an in-memory database opens a separate database.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!(%database_url, "storage ready");
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    // -- Profiles --

    /// Finds the profile for an external user id, creating it on first sight.
    pub async fn upsert_profile(
        &self,
        user_id: &str,
        name: &str,
        image_url: &str,
        email: &str,
    ) -> Result<Profile> {
        let now = Utc::now();
        let row = sqlx::query(
            "INSERT INTO profiles (id, user_id, name, image_url, email, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET user_id = excluded.user_id
             RETURNING id, user_id, name, image_url, email",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(name)
        .bind(image_url)
        .bind(email)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        profile_from_row(&row)
    }

    pub async fn profile(&self, profile_id: &ProfileId) -> Result<Option<Profile>> {
        let row = sqlx::query("SELECT id, user_id, name, image_url, email FROM profiles WHERE id = ?")
            .bind(profile_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(profile_from_row).transpose()
    }

    // -- Servers and members --

    /// Creates a server owned by `profile_id`. The owner joins as admin and a
    /// `general` text channel is opened.
    pub async fn create_server(
        &self,
        profile_id: &ProfileId,
        name: &str,
        image_url: &str,
    ) -> Result<(Server, Channel)> {
        let now = Utc::now();
        let server = Server {
            id: ServerId::generate(),
            name: name.to_string(),
            image_url: image_url.to_string(),
            invite_code: Uuid::new_v4().to_string(),
            profile_id: profile_id.clone(),
        };
        let channel = Channel {
            id: ChannelId::generate(),
            name: "general".to_string(),
            kind: ChannelKind::Text,
            profile_id: profile_id.clone(),
            server_id: server.id.clone(),
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO servers (id, name, image_url, invite_code, profile_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(server.id.as_str())
        .bind(&server.name)
        .bind(&server.image_url)
        .bind(&server.invite_code)
        .bind(profile_id.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("failed to insert server")?;
        sqlx::query(
            "INSERT INTO members (id, role, profile_id, server_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(MemberId::generate().as_str())
        .bind(MemberRole::Admin.as_str())
        .bind(profile_id.as_str())
        .bind(server.id.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("failed to insert owner membership")?;
        sqlx::query(
            "INSERT INTO channels (id, name, kind, profile_id, server_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(channel.id.as_str())
        .bind(&channel.name)
        .bind(channel.kind.as_str())
        .bind(profile_id.as_str())
        .bind(server.id.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("failed to insert default channel")?;
        tx.commit().await?;

        Ok((server, channel))
    }

    pub async fn server_by_invite(&self, invite_code: &str) -> Result<Option<Server>> {
        let row = sqlx::query(
            "SELECT id, name, image_url, invite_code, profile_id FROM servers WHERE invite_code = ?",
        )
        .bind(invite_code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| Server {
            id: ServerId(r.get("id")),
            name: r.get("name"),
            image_url: r.get("image_url"),
            invite_code: r.get("invite_code"),
            profile_id: ProfileId(r.get("profile_id")),
        }))
    }

    /// Adds `profile_id` to the server. An existing membership is returned
    /// unchanged.
    pub async fn add_member(
        &self,
        server_id: &ServerId,
        profile_id: &ProfileId,
        role: MemberRole,
    ) -> Result<Member> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO members (id, role, profile_id, server_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(server_id, profile_id) DO NOTHING",
        )
        .bind(MemberId::generate().as_str())
        .bind(role.as_str())
        .bind(profile_id.as_str())
        .bind(server_id.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        self.member(server_id, profile_id)
            .await?
            .ok_or_else(|| anyhow!("membership for server {server_id} vanished after insert"))
    }

    pub async fn member(
        &self,
        server_id: &ServerId,
        profile_id: &ProfileId,
    ) -> Result<Option<Member>> {
        let row = sqlx::query(
            "SELECT id, role, profile_id, server_id FROM members WHERE server_id = ? AND profile_id = ?",
        )
        .bind(server_id.as_str())
        .bind(profile_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| Member {
            id: MemberId(r.get("id")),
            role: MemberRole::parse(r.get::<String, _>("role").as_str()),
            profile_id: ProfileId(r.get("profile_id")),
            server_id: ServerId(r.get("server_id")),
        }))
    }

    // -- Channels --

    pub async fn create_channel(
        &self,
        server_id: &ServerId,
        profile_id: &ProfileId,
        name: &str,
        kind: ChannelKind,
    ) -> Result<Channel> {
        let now = Utc::now();
        let channel = Channel {
            id: ChannelId::generate(),
            name: name.to_string(),
            kind,
            profile_id: profile_id.clone(),
            server_id: server_id.clone(),
        };
        sqlx::query(
            "INSERT INTO channels (id, name, kind, profile_id, server_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(channel.id.as_str())
        .bind(&channel.name)
        .bind(kind.as_str())
        .bind(profile_id.as_str())
        .bind(server_id.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(channel)
    }

    pub async fn channel(&self, channel_id: &ChannelId) -> Result<Option<Channel>> {
        let row = sqlx::query("SELECT id, name, kind, profile_id, server_id FROM channels WHERE id = ?")
            .bind(channel_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(channel_from_row))
    }

    /// First channel in `server_id` created by `profile_id`.
    pub async fn channel_created_by(
        &self,
        server_id: &ServerId,
        profile_id: &ProfileId,
    ) -> Result<Option<Channel>> {
        let row = sqlx::query(
            "SELECT id, name, kind, profile_id, server_id FROM channels
             WHERE server_id = ? AND profile_id = ?
             ORDER BY created_at ASC
             LIMIT 1",
        )
        .bind(server_id.as_str())
        .bind(profile_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(channel_from_row))
    }

    // -- Messages --

    pub async fn insert_message(
        &self,
        channel_id: &ChannelId,
        member_id: &MemberId,
        content: &str,
        file_url: Option<&str>,
    ) -> Result<MessageWithMember> {
        let message_id = MessageId::generate();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO messages (id, content, file_url, member_id, channel_id, deleted, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(message_id.as_str())
        .bind(content)
        .bind(file_url)
        .bind(member_id.as_str())
        .bind(channel_id.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("failed to insert message")?;
        self.require_message(&message_id).await
    }

    pub async fn message_in_channel(
        &self,
        message_id: &MessageId,
        channel_id: &ChannelId,
    ) -> Result<Option<MessageWithMember>> {
        let row = sqlx::query(&format!("{MESSAGE_SELECT} WHERE m.id = ? AND m.channel_id = ?"))
            .bind(message_id.as_str())
            .bind(channel_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(message_from_row).transpose()
    }

    pub async fn update_message_content(
        &self,
        message_id: &MessageId,
        content: &str,
    ) -> Result<MessageWithMember> {
        sqlx::query("UPDATE messages SET content = ?, updated_at = ? WHERE id = ?")
            .bind(content)
            .bind(Utc::now())
            .bind(message_id.as_str())
            .execute(&self.pool)
            .await?;
        self.require_message(message_id).await
    }

    /// Soft-deletes a message: the row stays in place so pagination cursors
    /// remain valid, its content is replaced and its attachment dropped.
    pub async fn mark_message_deleted(
        &self,
        message_id: &MessageId,
        replacement: &str,
    ) -> Result<MessageWithMember> {
        sqlx::query(
            "UPDATE messages SET content = ?, file_url = NULL, deleted = 1, updated_at = ? WHERE id = ?",
        )
        .bind(replacement)
        .bind(Utc::now())
        .bind(message_id.as_str())
        .execute(&self.pool)
        .await?;
        self.require_message(message_id).await
    }

    /// Newest-first page of a channel's messages, starting after `before`
    /// when given.
    pub async fn list_channel_messages(
        &self,
        channel_id: &ChannelId,
        limit: u32,
        before: Option<&MessageId>,
    ) -> Result<Vec<MessageWithMember>> {
        let rows = if let Some(cursor) = before {
            sqlx::query(&format!(
                "{MESSAGE_SELECT}
                 WHERE m.channel_id = ?
                   AND m.rowid < (SELECT rowid FROM messages WHERE id = ?)
                 ORDER BY m.rowid DESC
                 LIMIT ?"
            ))
            .bind(channel_id.as_str())
            .bind(cursor.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(&format!(
                "{MESSAGE_SELECT}
                 WHERE m.channel_id = ?
                 ORDER BY m.rowid DESC
                 LIMIT ?"
            ))
            .bind(channel_id.as_str())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        };

        rows.iter().map(message_from_row).collect()
    }

    async fn require_message(&self, message_id: &MessageId) -> Result<MessageWithMember> {
        let row = sqlx::query(&format!("{MESSAGE_SELECT} WHERE m.id = ?"))
            .bind(message_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| anyhow!("message {message_id} not found"))?;
        message_from_row(&row)
    }
}

fn profile_from_row(row: &SqliteRow) -> Result<Profile> {
    Ok(Profile {
        id: ProfileId(row.try_get("id")?),
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        image_url: row.try_get("image_url")?,
        email: row.try_get("email")?,
    })
}

fn channel_from_row(row: &SqliteRow) -> Channel {
    Channel {
        id: ChannelId(row.get("id")),
        name: row.get("name"),
        kind: ChannelKind::parse(row.get::<String, _>("kind").as_str()),
        profile_id: ProfileId(row.get("profile_id")),
        server_id: ServerId(row.get("server_id")),
    }
}

fn message_from_row(row: &SqliteRow) -> Result<MessageWithMember> {
    let member_id = MemberId(row.try_get("member_id")?);
    let profile_id = ProfileId(row.try_get("profile_id")?);
    Ok(MessageWithMember {
        id: MessageId(row.try_get("message_id")?),
        content: row.try_get("content")?,
        file_url: row.try_get("file_url")?,
        member_id: member_id.clone(),
        channel_id: ChannelId(row.try_get("channel_id")?),
        deleted: row.try_get("deleted")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        member: MemberWithProfile {
            member: Member {
                id: member_id,
                role: MemberRole::parse(row.try_get::<String, _>("role")?.as_str()),
                profile_id: profile_id.clone(),
                server_id: ServerId(row.try_get("server_id")?),
            },
            profile: Profile {
                id: profile_id,
                user_id: row.try_get("user_id")?,
                name: row.try_get("profile_name")?,
                image_url: row.try_get("image_url")?,
                email: row.try_get("email")?,
            },
        },
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
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

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
