//! SQLite-backed state store
//!
//! One `state` table of key/value pairs, shared by every service on the
//! device through the same database file. WAL mode keeps concurrent
//! readers off the writer's back.

use super::{ChangeFeed, ChangeNotice, ConsumerId, StateStore};
use crate::error::Error;
use crate::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;
use tokio::sync::broadcast;
use tracing::info;

/// Default cap on a single stored value. Large media belongs in the blob
/// store; inline data URLs beyond this size are rejected rather than
/// silently bloating the database.
pub const DEFAULT_VALUE_LIMIT: usize = 5 * 1024 * 1024;

const CHANGE_CAPACITY: usize = 256;

pub struct SqliteStateStore {
    pool: SqlitePool,
    changes: broadcast::Sender<ChangeNotice>,
    value_limit: usize,
}

impl SqliteStateStore {
    /// Open (creating if needed) the state database at the given path.
    pub async fn open(db_path: &Path) -> Result<Self> {
        let newly_created = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        if newly_created {
            info!("Initialized new state database: {}", db_path.display());
        } else {
            info!("Opened existing state database: {}", db_path.display());
        }

        // WAL lets the heartbeat and engine write while admins read
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&pool)
            .await?;

        sqlx::query("PRAGMA busy_timeout = 5000")
            .execute(&pool)
            .await?;

        Self::from_pool(pool).await
    }

    /// In-memory database, used by tests.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Ok(Self {
            pool,
            changes,
            value_limit: DEFAULT_VALUE_LIMIT,
        })
    }

    /// Override the per-value size cap.
    pub fn with_value_limit(mut self, limit: usize) -> Self {
        self.value_limit = limit;
        self
    }

    fn notify(&self, key: &str, origin: ConsumerId) {
        // Send fails only when nobody is listening, which is fine
        let _ = self.changes.send(ChangeNotice {
            key: key.to_string(),
            origin,
        });
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn write(&self, key: &str, value: &str, origin: ConsumerId) -> Result<()> {
        if value.len() > self.value_limit {
            return Err(Error::Capacity {
                key: key.to_string(),
                size: value.len(),
                limit: self.value_limit,
            });
        }

        sqlx::query(
            r#"
            INSERT INTO state (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(crate::time::now_millis() as i64)
        .execute(&self.pool)
        .await?;

        self.notify(key, origin);
        Ok(())
    }

    async fn remove(&self, key: &str, origin: ConsumerId) -> Result<()> {
        sqlx::query("DELETE FROM state WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        self.notify(key, origin);
        Ok(())
    }

    fn watch(&self, me: ConsumerId) -> ChangeFeed {
        ChangeFeed::new(self.changes.subscribe(), me)
    }
}
