//! Sync conflict repository

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    ConflictStatus, FieldMap, NewConflict, ResolutionStrategy, SyncConflict, SyncTable,
};

const CONFLICT_COLUMNS: &str = "id, table_name, record_uuid, local_data, server_data, \
     conflict_reason, status, resolution_strategy, resolved_by, resolved_at, created_at";

/// Outcome of recording a detected conflict
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedConflict {
    pub conflict: SyncConflict,
    /// False when an existing pending conflict for the same record was refreshed
    pub is_new: bool,
}

/// Trait for conflict storage operations
pub trait ConflictRepository {
    /// Persist a detected conflict.
    ///
    /// At most one pending conflict exists per record: a repeated detection
    /// refreshes the snapshots and reason of the pending one instead.
    fn record(&self, conflict: &NewConflict, now: i64) -> Result<RecordedConflict>;

    /// Get a conflict by id
    fn get(&self, id: i64) -> Result<Option<SyncConflict>>;

    /// The pending conflict for a record, if any
    fn pending_for(&self, table: SyncTable, uuid: &Uuid) -> Result<Option<SyncConflict>>;

    /// List conflicts newest first, optionally filtered by status
    fn list(&self, status: Option<ConflictStatus>, limit: usize) -> Result<Vec<SyncConflict>>;

    /// Number of conflicts awaiting resolution
    fn count_pending(&self) -> Result<usize>;

    /// Move a pending conflict to a terminal status.
    ///
    /// Returns false if the conflict is not pending (already closed or absent).
    fn close(
        &self,
        id: i64,
        status: ConflictStatus,
        strategy: Option<ResolutionStrategy>,
        actor: &str,
        now: i64,
    ) -> Result<bool>;
}

/// `SQLite` implementation of `ConflictRepository`
pub struct SqliteConflictRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteConflictRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_conflict(row: &Row<'_>) -> rusqlite::Result<SyncConflict> {
        Ok(SyncConflict {
            id: row.get(0)?,
            table_name: parse_column(row, 1, |text: &str| text.parse::<SyncTable>())?,
            record_uuid: parse_column(row, 2, Uuid::parse_str)?,
            local_data: parse_column(row, 3, |text: &str| serde_json::from_str::<FieldMap>(text))?,
            server_data: parse_column(row, 4, |text: &str| serde_json::from_str::<FieldMap>(text))?,
            conflict_reason: row.get(5)?,
            status: parse_column(row, 6, |text: &str| text.parse::<ConflictStatus>())?,
            resolution_strategy: row
                .get::<_, Option<String>>(7)?
                .map(|text| {
                    text.parse::<ResolutionStrategy>().map_err(|error| {
                        rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(error))
                    })
                })
                .transpose()?,
            resolved_by: row.get(8)?,
            resolved_at: row.get(9)?,
            created_at: row.get(10)?,
        })
    }
}

fn parse_column<T, E>(
    row: &Row<'_>,
    index: usize,
    parse: impl FnOnce(&str) -> std::result::Result<T, E>,
) -> rusqlite::Result<T>
where
    E: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(index)?;
    parse(&text)
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error)))
}

impl ConflictRepository for SqliteConflictRepository<'_> {
    fn record(&self, conflict: &NewConflict, now: i64) -> Result<RecordedConflict> {
        let local_data = serde_json::to_string(&conflict.local_data)?;
        let server_data = serde_json::to_string(&conflict.server_data)?;

        if let Some(existing) = self.pending_for(conflict.table_name, &conflict.record_uuid)? {
            self.conn.execute(
                "UPDATE sync_conflicts
                 SET local_data = ?, server_data = ?, conflict_reason = ?
                 WHERE id = ?",
                params![local_data, server_data, conflict.conflict_reason, existing.id],
            )?;
            tracing::debug!(
                "Refreshed pending conflict {} for {} {}",
                existing.id,
                conflict.table_name,
                conflict.record_uuid
            );
            let refreshed = SyncConflict {
                local_data: conflict.local_data.clone(),
                server_data: conflict.server_data.clone(),
                conflict_reason: conflict.conflict_reason.clone(),
                ..existing
            };
            return Ok(RecordedConflict {
                conflict: refreshed,
                is_new: false,
            });
        }

        self.conn.execute(
            "INSERT INTO sync_conflicts
                (table_name, record_uuid, local_data, server_data, conflict_reason, status, created_at)
             VALUES (?, ?, ?, ?, ?, 'pending', ?)",
            params![
                conflict.table_name.as_str(),
                conflict.record_uuid.to_string(),
                local_data,
                server_data,
                conflict.conflict_reason,
                now
            ],
        )?;

        Ok(RecordedConflict {
            conflict: SyncConflict {
                id: self.conn.last_insert_rowid(),
                table_name: conflict.table_name,
                record_uuid: conflict.record_uuid,
                local_data: conflict.local_data.clone(),
                server_data: conflict.server_data.clone(),
                conflict_reason: conflict.conflict_reason.clone(),
                status: ConflictStatus::Pending,
                resolution_strategy: None,
                resolved_by: None,
                resolved_at: None,
                created_at: now,
            },
            is_new: true,
        })
    }

    fn get(&self, id: i64) -> Result<Option<SyncConflict>> {
        let conflict = self
            .conn
            .query_row(
                &format!("SELECT {CONFLICT_COLUMNS} FROM sync_conflicts WHERE id = ?"),
                params![id],
                Self::parse_conflict,
            )
            .optional()?;
        Ok(conflict)
    }

    fn pending_for(&self, table: SyncTable, uuid: &Uuid) -> Result<Option<SyncConflict>> {
        let conflict = self
            .conn
            .query_row(
                &format!(
                    "SELECT {CONFLICT_COLUMNS} FROM sync_conflicts
                     WHERE table_name = ? AND record_uuid = ? AND status = 'pending'"
                ),
                params![table.as_str(), uuid.to_string()],
                Self::parse_conflict,
            )
            .optional()?;
        Ok(conflict)
    }

    fn list(&self, status: Option<ConflictStatus>, limit: usize) -> Result<Vec<SyncConflict>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONFLICT_COLUMNS} FROM sync_conflicts
             WHERE (?1 IS NULL OR status = ?1)
             ORDER BY created_at DESC, id DESC
             LIMIT ?2"
        ))?;

        let conflicts = stmt
            .query_map(
                params![status.map(ConflictStatus::as_str), limit as i64],
                Self::parse_conflict,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(conflicts)
    }

    fn count_pending(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sync_conflicts WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn close(
        &self,
        id: i64,
        status: ConflictStatus,
        strategy: Option<ResolutionStrategy>,
        actor: &str,
        now: i64,
    ) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE sync_conflicts
             SET status = ?, resolution_strategy = ?, resolved_by = ?, resolved_at = ?
             WHERE id = ? AND status = 'pending'",
            params![
                status.as_str(),
                strategy.map(ResolutionStrategy::as_str),
                actor,
                now,
                id
            ],
        )?;
        Ok(rows > 0)
    }
}
