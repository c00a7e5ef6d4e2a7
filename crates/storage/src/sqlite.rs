use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use shared::domain::{DisplayName, GroupName, Message, ThreadKey};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use tracing::warn;

use crate::{ensure_parent_dir_exists, sqlite_path, HubSnapshot, SnapshotStore};

const GROUP_KIND: &str = "group";
const PRIVATE_KIND: &str = "private";

/// Snapshot spread across a handful of SQLite tables. Each save rewrites the
/// tables inside a single transaction, so readers never see half a snapshot.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    database_url: String,
}

impl SqliteStore {
    pub async fn open(database_url: &str) -> Result<Self> {
        if let Some(path) = sqlite_path(database_url) {
            ensure_parent_dir_exists(&path)?;
        }

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid sqlite url '{database_url}'"))?
            .create_if_missing(true);
        let store = Self::connect(database_url, connect_options).await?;
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Opens an existing database for reading. Nothing is created: a missing
    /// file is an error and the schema is left alone.
    pub async fn open_read_only(database_url: &str) -> Result<Self> {
        if database_url.starts_with("sqlite::memory:") {
            return Self::open(database_url).await;
        }
        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid sqlite url '{database_url}'"))?
            .create_if_missing(false)
            .read_only(true);
        Self::connect(database_url, connect_options).await
    }

    async fn connect(database_url: &str, connect_options: SqliteConnectOptions) -> Result<Self> {
        // Every pooled connection to `sqlite::memory:` would get its own
        // empty database.
        let max_connections = if database_url.starts_with("sqlite::memory:") {
            1
        } else {
            5
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open sqlite database '{database_url}'"))?;

        Ok(Self {
            pool,
            database_url: database_url.to_string(),
        })
    }

    async fn ensure_schema(&self) -> Result<()> {
        for statement in [
            r#"
            CREATE TABLE IF NOT EXISTS hub_groups (
                name TEXT PRIMARY KEY NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS hub_group_members (
                group_name TEXT NOT NULL,
                member     TEXT NOT NULL,
                position   INTEGER NOT NULL,
                PRIMARY KEY (group_name, member)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS hub_private_threads (
                thread_key TEXT PRIMARY KEY NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS hub_messages (
                conversation_kind TEXT NOT NULL,
                conversation_id   TEXT NOT NULL,
                position          INTEGER NOT NULL,
                body              TEXT NOT NULL,
                PRIMARY KEY (conversation_kind, conversation_id, position)
            )
            "#,
        ] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("failed to ensure hub snapshot tables exist")?;
        }
        Ok(())
    }

    async fn load_messages(&self, kind: &str, conversation_id: &str) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT body FROM hub_messages
             WHERE conversation_kind = ? AND conversation_id = ?
             ORDER BY position ASC",
        )
        .bind(kind)
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = Vec::with_capacity(rows.len());
        for row in rows {
            let body: String = row.try_get(0)?;
            match serde_json::from_str::<Message>(&body) {
                Ok(message) => messages.push(message),
                Err(error) => warn!(%kind, %conversation_id, %error, "skipping unreadable message row"),
            }
        }
        Ok(messages)
    }
}

#[async_trait]
impl SnapshotStore for SqliteStore {
    async fn load(&self) -> Result<Option<HubSnapshot>> {
        let group_rows = sqlx::query("SELECT name FROM hub_groups ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        let thread_rows = sqlx::query("SELECT thread_key FROM hub_private_threads ORDER BY thread_key")
            .fetch_all(&self.pool)
            .await?;
        if group_rows.is_empty() && thread_rows.is_empty() {
            return Ok(None);
        }

        let mut snapshot = HubSnapshot::default();
        for row in group_rows {
            let raw_name: String = row.try_get(0)?;
            let name = GroupName::parse(&raw_name)
                .with_context(|| format!("unreadable group name '{raw_name}'"))?;

            let member_rows = sqlx::query(
                "SELECT member FROM hub_group_members WHERE group_name = ? ORDER BY position ASC",
            )
            .bind(&raw_name)
            .fetch_all(&self.pool)
            .await?;
            let mut record = crate::GroupRecord::default();
            for member_row in member_rows {
                let member: String = member_row.try_get(0)?;
                record.members.push(
                    DisplayName::parse(&member)
                        .with_context(|| format!("unreadable member of group '{name}'"))?,
                );
            }
            record.messages = self.load_messages(GROUP_KIND, &raw_name).await?;
            snapshot.groups.insert(name, record);
        }

        for row in thread_rows {
            let raw_key: String = row.try_get(0)?;
            let Some(key) = ThreadKey::from_raw(&raw_key) else {
                warn!(thread = %raw_key, "skipping private thread with unreadable key");
                continue;
            };
            let messages = self.load_messages(PRIVATE_KIND, &raw_key).await?;
            snapshot
                .private_threads
                .entry(key)
                .or_default()
                .messages
                .extend(messages);
        }
        for thread in snapshot.private_threads.values_mut() {
            thread.messages.sort_by_key(|message| message.ts);
        }

        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &HubSnapshot) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for table in [
            "hub_messages",
            "hub_group_members",
            "hub_groups",
            "hub_private_threads",
        ] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await
                .with_context(|| format!("failed to clear {table}"))?;
        }

        for (name, group) in &snapshot.groups {
            sqlx::query("INSERT INTO hub_groups (name) VALUES (?)")
                .bind(name.as_str())
                .execute(&mut *tx)
                .await?;
            for (position, member) in group.members.iter().enumerate() {
                sqlx::query(
                    "INSERT OR IGNORE INTO hub_group_members (group_name, member, position) VALUES (?, ?, ?)",
                )
                .bind(name.as_str())
                .bind(member.as_str())
                .bind(position as i64)
                .execute(&mut *tx)
                .await?;
            }
            for (position, message) in group.messages.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO hub_messages (conversation_kind, conversation_id, position, body) VALUES (?, ?, ?, ?)",
                )
                .bind(GROUP_KIND)
                .bind(name.as_str())
                .bind(position as i64)
                .bind(serde_json::to_string(message)?)
                .execute(&mut *tx)
                .await?;
            }
        }

        for (key, thread) in &snapshot.private_threads {
            sqlx::query("INSERT INTO hub_private_threads (thread_key) VALUES (?)")
                .bind(key.as_str())
                .execute(&mut *tx)
                .await?;
            for (position, message) in thread.messages.iter().enumerate() {
                sqlx::query(
                    "INSERT INTO hub_messages (conversation_kind, conversation_id, position, body) VALUES (?, ?, ?, ?)",
                )
                .bind(PRIVATE_KIND)
                .bind(key.as_str())
                .bind(position as i64)
                .bind(serde_json::to_string(message)?)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await.context("failed to commit snapshot")?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite {}", self.database_url)
    }
}
