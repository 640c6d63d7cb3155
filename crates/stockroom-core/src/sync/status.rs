//! Snapshot of local sync health

use rusqlite::Connection;
use serde::Serialize;

use crate::db::{
    ConflictRepository, RecordRepository, SqliteConflictRepository, SqliteRecordRepository,
    SqliteSyncStateRepository, SyncStateRepository,
};
use crate::error::Result;
use crate::models::SyncTable;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableStatus {
    pub table: SyncTable,
    pub dirty: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatusReport {
    pub tables: Vec<TableStatus>,
    pub pending_conflicts: usize,
    pub pull_checkpoint: Option<String>,
    pub last_push_at: Option<i64>,
    pub last_pull_at: Option<i64>,
}

impl SyncStatusReport {
    pub fn load(conn: &Connection) -> Result<Self> {
        let records = SqliteRecordRepository::new(conn);
        let tables = SyncTable::ALL
            .into_iter()
            .map(|table| {
                Ok(TableStatus {
                    table,
                    dirty: records.count_unsynced(table)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let state = SqliteSyncStateRepository::new(conn);

        Ok(Self {
            tables,
            pending_conflicts: SqliteConflictRepository::new(conn).count_pending()?,
            pull_checkpoint: state.pull_checkpoint()?,
            last_push_at: state.last_push_at()?,
            last_pull_at: state.last_pull_at()?,
        })
    }

    pub fn total_dirty(&self) -> usize {
        self.tables.iter().map(|table| table.dirty).sum()
    }

    /// Nothing waiting to be pushed and nothing to resolve
    pub fn is_settled(&self) -> bool {
        self.total_dirty() == 0 && self.pending_conflicts == 0
    }
}
