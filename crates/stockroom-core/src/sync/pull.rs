//! Pull task: download server updates and apply them locally.

use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use uuid::Uuid;

use super::client::SyncTransport;
use super::notify::{SyncNotifier, SyncSummary, TaskKind, TaskOutcome};
use super::protocol::{split_wire_record, PullResponse};
use crate::config::SyncConfig;
use crate::db::{
    ConflictRepository, RecordRepository, SqliteConflictRepository, SqliteRecordRepository,
    SqliteSyncStateRepository, SyncStateRepository,
};
use crate::error::Result;
use crate::models::{FieldMap, NewConflict, SyncTable, Syncable, PENDING_LOCAL_CHANGES_REASON};
use crate::services::DatabaseService;
use crate::util::now_millis;

#[derive(Debug, Default, PartialEq, Eq)]
struct PullApplication {
    inserted: usize,
    updated: usize,
    conflicts: usize,
}

/// Downloads updates since the last checkpoint and applies them atomically.
pub struct PullTask<T> {
    db: DatabaseService,
    transport: Arc<T>,
    notifier: Arc<dyn SyncNotifier>,
    retry_delay: Duration,
}

impl<T: SyncTransport> PullTask<T> {
    pub fn new(
        db: DatabaseService,
        transport: Arc<T>,
        config: &SyncConfig,
        notifier: Arc<dyn SyncNotifier>,
    ) -> Self {
        Self {
            db,
            transport,
            notifier,
            retry_delay: config.retry_delay,
        }
    }

    /// Run once and deliver a summary to the notifier.
    pub async fn run(&self) -> TaskOutcome {
        let outcome = {
            let _gate = self.db.sync_gate().await;
            match self.execute().await {
                Ok(outcome) => outcome,
                Err(error) => {
                    tracing::warn!(
                        "Pull failed, retrying in {}s: {error}",
                        self.retry_delay.as_secs()
                    );
                    TaskOutcome::Rescheduled {
                        after: self.retry_delay,
                        error: error.to_string(),
                    }
                }
            }
        };
        self.notifier
            .notify(&SyncSummary::from_outcome(TaskKind::Pull, &outcome));
        outcome
    }

    async fn execute(&self) -> Result<TaskOutcome> {
        let checkpoint = self
            .db
            .with_db(|db| SqliteSyncStateRepository::new(db.connection()).pull_checkpoint())
            .await?;
        let started_at = now_millis();

        let response = self.transport.pull(checkpoint.as_deref()).await?;
        if response.is_empty() {
            tracing::debug!("No server updates since {:?}", checkpoint);
            return Ok(TaskOutcome::Idle);
        }

        tracing::info!("Applying {} server update(s)", response.record_count());
        let applied = self
            .db
            .with_db(|db| apply_updates(db.connection(), &response, started_at, now_millis()))
            .await?;
        tracing::debug!(
            inserted = applied.inserted,
            updated = applied.updated,
            conflicts = applied.conflicts,
            "Pull applied"
        );

        Ok(TaskOutcome::Completed {
            synced: applied.inserted + applied.updated,
            conflicts: applied.conflicts,
        })
    }
}

/// Apply every update of one pull in a single transaction.
///
/// Any invalid batch or record rolls back the whole pull.
fn apply_updates(
    conn: &Connection,
    response: &PullResponse,
    started_at: i64,
    now: i64,
) -> Result<PullApplication> {
    let tx = conn.unchecked_transaction()?;
    let records = SqliteRecordRepository::new(&tx);
    let conflicts = SqliteConflictRepository::new(&tx);
    let mut applied = PullApplication::default();

    for batch in response.updates.iter().flatten() {
        let table = batch.sync_table().map_err(|error| {
            tracing::warn!("Rejecting pull: unknown table '{}'", batch.table);
            error
        })?;
        for wire in &batch.records {
            let (uuid, server_fields) = split_wire_record(wire).map_err(|error| {
                tracing::warn!("Rejecting pull: malformed {table} record: {error}");
                error
            })?;
            apply_record(&records, &conflicts, table, uuid, server_fields, now, &mut applied)
                .map_err(|error| {
                    tracing::warn!("Rejecting pull: {table} {uuid} could not be applied: {error}");
                    error
                })?;
        }
    }

    let state = SqliteSyncStateRepository::new(&tx);
    let checkpoint = response
        .checkpoint
        .clone()
        .unwrap_or_else(|| started_at.to_string());
    state.set_pull_checkpoint(&checkpoint)?;
    state.set_last_pull_at(now)?;
    tx.commit()?;
    Ok(applied)
}

fn apply_record(
    records: &SqliteRecordRepository<'_>,
    conflicts: &SqliteConflictRepository<'_>,
    table: SyncTable,
    uuid: Uuid,
    server_fields: FieldMap,
    now: i64,
    applied: &mut PullApplication,
) -> Result<()> {
    match records.get(table, &uuid)? {
        None => {
            records.insert_from_server(table, uuid, &server_fields, now)?;
            applied.inserted += 1;
        }
        Some(local) if !local.is_dirty() => {
            records.apply_server_fields(table, &uuid, &server_fields, now)?;
            applied.updated += 1;
        }
        Some(local) => {
            let recorded = conflicts.record(
                &NewConflict {
                    table_name: table,
                    record_uuid: uuid,
                    local_data: local.fields,
                    server_data: server_fields,
                    conflict_reason: PENDING_LOCAL_CHANGES_REASON.to_string(),
                },
                now,
            )?;
            tracing::info!(
                "Conflict {} on {table} {uuid}: local changes pending",
                recorded.conflict.id
            );
            applied.conflicts += 1;
        }
    }
    Ok(())
}
