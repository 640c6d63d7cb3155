//! Sync state repository (pull checkpoint and last-run bookkeeping)

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;

const PULL_CHECKPOINT_KEY: &str = "pull_checkpoint";
const LAST_PUSH_AT_KEY: &str = "last_push_at";
const LAST_PULL_AT_KEY: &str = "last_pull_at";

/// Trait for sync state storage operations
pub trait SyncStateRepository {
    /// Opaque checkpoint returned by the last successful pull
    fn pull_checkpoint(&self) -> Result<Option<String>>;

    fn set_pull_checkpoint(&self, checkpoint: &str) -> Result<()>;

    /// Last successful push (Unix ms)
    fn last_push_at(&self) -> Result<Option<i64>>;

    fn set_last_push_at(&self, timestamp: i64) -> Result<()>;

    /// Last successful pull (Unix ms)
    fn last_pull_at(&self) -> Result<Option<i64>>;

    fn set_last_pull_at(&self, timestamp: i64) -> Result<()>;
}

/// `SQLite` implementation of `SyncStateRepository`
pub struct SqliteSyncStateRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSyncStateRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn get_value(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM sync_state WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_value(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO sync_state (key, value) VALUES (?, ?)",
            params![key, value],
        )?;
        Ok(())
    }

    fn get_timestamp(&self, key: &str) -> Result<Option<i64>> {
        Ok(self
            .get_value(key)?
            .and_then(|value| value.trim().parse().ok()))
    }
}

impl SyncStateRepository for SqliteSyncStateRepository<'_> {
    fn pull_checkpoint(&self) -> Result<Option<String>> {
        self.get_value(PULL_CHECKPOINT_KEY)
    }

    fn set_pull_checkpoint(&self, checkpoint: &str) -> Result<()> {
        self.set_value(PULL_CHECKPOINT_KEY, checkpoint)
    }

    fn last_push_at(&self) -> Result<Option<i64>> {
        self.get_timestamp(LAST_PUSH_AT_KEY)
    }

    fn set_last_push_at(&self, timestamp: i64) -> Result<()> {
        self.set_value(LAST_PUSH_AT_KEY, &timestamp.to_string())
    }

    fn last_pull_at(&self) -> Result<Option<i64>> {
        self.get_timestamp(LAST_PULL_AT_KEY)
    }

    fn set_last_pull_at(&self, timestamp: i64) -> Result<()> {
        self.set_value(LAST_PULL_AT_KEY, &timestamp.to_string())
    }
}
