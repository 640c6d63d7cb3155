//! Push task: upload dirty records and reconcile the server's answer.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use uuid::Uuid;

use super::client::SyncTransport;
use super::notify::{SyncNotifier, SyncSummary, TaskKind, TaskOutcome};
use super::protocol::{PushConflict, PushRequest, PushResponse, TableBatch};
use crate::config::SyncConfig;
use crate::db::{
    ConflictRepository, RecordRepository, SqliteConflictRepository, SqliteRecordRepository,
    SqliteSyncStateRepository, SyncStateRepository,
};
use crate::error::Result;
use crate::models::{FieldMap, NewConflict, SyncRecord, SyncTable, Syncable};
use crate::services::DatabaseService;
use crate::util::now_millis;

const DEFAULT_PUSH_CONFLICT_REASON: &str = "server rejected record";

/// Dirty records read for one push, with the revision each was read at
#[derive(Debug, Default)]
struct DirtySnapshot {
    batches: Vec<(SyncTable, Vec<SyncRecord>)>,
}

impl DirtySnapshot {
    /// Records with a pending conflict are held back until it is closed.
    fn read(conn: &Connection) -> Result<Self> {
        let repo = SqliteRecordRepository::new(conn);
        let conflicts = SqliteConflictRepository::new(conn);
        let mut batches = Vec::new();
        for table in SyncTable::ALL {
            let mut records = Vec::new();
            for record in repo.unsynced_records(table)? {
                if conflicts.pending_for(table, &record.uuid())?.is_some() {
                    tracing::debug!(
                        "Holding back {table} {} until its conflict is closed",
                        record.uuid()
                    );
                    continue;
                }
                records.push(record);
            }
            if !records.is_empty() {
                batches.push((table, records));
            }
        }
        Ok(Self { batches })
    }

    fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    fn request(&self) -> PushRequest {
        PushRequest {
            data: self
                .batches
                .iter()
                .map(|(table, records)| TableBatch::from_records(*table, records))
                .collect(),
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct PushReconciliation {
    synced: usize,
    /// Edited locally while the request was in flight
    kept_dirty: usize,
    conflicts: usize,
}

/// Uploads all locally dirty records in one request.
pub struct PushTask<T> {
    db: DatabaseService,
    transport: Arc<T>,
    notifier: Arc<dyn SyncNotifier>,
    retry_delay: Duration,
}

impl<T: SyncTransport> PushTask<T> {
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
                        "Push failed, retrying in {}s: {error}",
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
            .notify(&SyncSummary::from_outcome(TaskKind::Push, &outcome));
        outcome
    }

    async fn execute(&self) -> Result<TaskOutcome> {
        let snapshot = self
            .db
            .with_db(|db| DirtySnapshot::read(db.connection()))
            .await?;
        if snapshot.is_empty() {
            tracing::debug!("No dirty records to push");
            return Ok(TaskOutcome::Idle);
        }

        let request = snapshot.request();
        tracing::info!("Pushing {} dirty record(s)", request.record_count());
        let response = self.transport.push(&request).await?;

        let result = self
            .db
            .with_db(|db| reconcile(db.connection(), &snapshot, &response, now_millis()))
            .await?;
        if result.kept_dirty > 0 {
            tracing::info!(
                "{} record(s) changed during push and stay dirty",
                result.kept_dirty
            );
        }

        Ok(TaskOutcome::Completed {
            synced: result.synced,
            conflicts: result.conflicts,
        })
    }
}

/// Apply a successful push response in one transaction.
fn reconcile(
    conn: &Connection,
    snapshot: &DirtySnapshot,
    response: &PushResponse,
    now: i64,
) -> Result<PushReconciliation> {
    let tx = conn.unchecked_transaction()?;
    let records = SqliteRecordRepository::new(&tx);
    let conflicts = SqliteConflictRepository::new(&tx);
    let mut result = PushReconciliation::default();

    let mut rejected: HashSet<(SyncTable, Uuid)> = HashSet::new();
    for conflict in &response.conflicts {
        let Some((table, uuid)) = conflict_key(conflict) else {
            continue;
        };
        rejected.insert((table, uuid));

        let Some(local) = records.get(table, &uuid)? else {
            tracing::warn!("Server reported a conflict for unknown local {table} {uuid}");
            continue;
        };
        conflicts.record(
            &NewConflict {
                table_name: table,
                record_uuid: uuid,
                local_data: local.fields,
                server_data: conflict.server_data.clone().unwrap_or_else(FieldMap::new),
                conflict_reason: conflict
                    .reason
                    .clone()
                    .unwrap_or_else(|| DEFAULT_PUSH_CONFLICT_REASON.to_string()),
            },
            now,
        )?;
        result.conflicts += 1;
    }

    for (table, batch) in &snapshot.batches {
        for record in batch {
            if rejected.contains(&(*table, record.uuid())) {
                continue;
            }
            if records.mark_synced_if_unchanged(*table, &record.uuid(), record.meta.revision, now)? {
                result.synced += 1;
            } else {
                result.kept_dirty += 1;
            }
        }
    }

    SqliteSyncStateRepository::new(&tx).set_last_push_at(now)?;
    tx.commit()?;
    Ok(result)
}

fn conflict_key(conflict: &PushConflict) -> Option<(SyncTable, Uuid)> {
    match (conflict.sync_table(), conflict.record_uuid()) {
        (Ok(table), Ok(uuid)) => Some((table, uuid)),
        (Err(error), _) | (_, Err(error)) => {
            tracing::warn!("Skipping malformed push conflict: {error}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConflictStatus, Customer, ResolutionStrategy};
    use crate::sync::testing::{fields, FakeTransport, RecordingNotifier};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn task(
        db: &DatabaseService,
        transport: &Arc<FakeTransport>,
        notifier: &Arc<RecordingNotifier>,
    ) -> PushTask<FakeTransport> {
        let config = SyncConfig::new("https://sync.example.com", "token", "user")
            .with_retry_delay(Duration::from_secs(300));
        PushTask::new(db.clone(), Arc::clone(transport), &config, notifier.clone())
    }

    async fn create_product(db: &DatabaseService, name: &str) -> SyncRecord {
        db.create_record(SyncTable::Products, fields(json!({"name": name})))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn no_dirty_records_makes_no_network_call() {
        let db = DatabaseService::open_in_memory().unwrap();
        let transport = Arc::new(FakeTransport::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let outcome = task(&db, &transport, &notifier).run().await;

        assert_eq!(outcome, TaskOutcome::Idle);
        assert_eq!(transport.push_calls(), 0);
        assert_eq!(notifier.summaries().len(), 1);
    }

    #[tokio::test]
    async fn successful_push_marks_all_records_synced() {
        let db = DatabaseService::open_in_memory().unwrap();
        let product = create_product(&db, "Tent").await;
        let customer = db
            .create_record(SyncTable::Customers, fields(json!({"name": "Ada"})))
            .await
            .unwrap();
        let transport = Arc::new(FakeTransport::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let outcome = task(&db, &transport, &notifier).run().await;

        assert_eq!(
            outcome,
            TaskOutcome::Completed {
                synced: 2,
                conflicts: 0
            }
        );
        let sent = transport.pushed_requests();
        assert_eq!(sent.len(), 1);
        let tables: Vec<&str> = sent[0].data.iter().map(|batch| batch.table.as_str()).collect();
        assert_eq!(tables, vec!["products", "customers"]);
        assert_eq!(sent[0].data[0].records[0]["uuid"], json!(product.uuid().to_string()));

        let product = db
            .get_record(SyncTable::Products, product.uuid())
            .await
            .unwrap()
            .unwrap();
        let customer = db
            .get_record(SyncTable::Customers, customer.uuid())
            .await
            .unwrap()
            .unwrap();
        assert!(!product.is_dirty());
        assert!(product.last_synced_at().is_some());
        assert!(!customer.is_dirty());
        assert!(db.status().await.unwrap().last_push_at.is_some());
    }

    #[tokio::test]
    async fn server_outage_leaves_dirty_set_unchanged() {
        let db = DatabaseService::open_in_memory().unwrap();
        let product = create_product(&db, "Tent").await;
        let transport = Arc::new(FakeTransport::default());
        transport.fail_next_push(crate::Error::Server {
            status: 503,
            message: "maintenance".to_string(),
        });
        let notifier = Arc::new(RecordingNotifier::default());

        let outcome = task(&db, &transport, &notifier).run().await;

        assert_eq!(outcome.retry_after(), Some(Duration::from_secs(300)));
        let record = db
            .get_record(SyncTable::Products, product.uuid())
            .await
            .unwrap()
            .unwrap();
        assert!(record.is_dirty());
        assert_eq!(record.last_synced_at(), None);
        assert_eq!(db.status().await.unwrap().total_dirty(), 1);
        assert_eq!(db.status().await.unwrap().last_push_at, None);

        let summaries = notifier.summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].retry_after, Some(Duration::from_secs(300)));
    }

    #[tokio::test]
    async fn server_conflicts_are_recorded_not_synced() {
        let db = DatabaseService::open_in_memory().unwrap();
        let accepted = create_product(&db, "Tent").await;
        let rejected = create_product(&db, "Stove").await;
        let transport = Arc::new(FakeTransport::default());
        transport.set_push_response(PushResponse {
            processed: 1,
            conflicts: vec![PushConflict {
                table: "products".to_string(),
                uuid: rejected.uuid().to_string(),
                server_data: Some(fields(json!({"name": "Camp Stove", "price": 30.0}))),
                reason: Some("stale revision".to_string()),
            }],
        });
        let notifier = Arc::new(RecordingNotifier::default());

        let outcome = task(&db, &transport, &notifier).run().await;
        assert_eq!(
            outcome,
            TaskOutcome::Completed {
                synced: 1,
                conflicts: 1
            }
        );

        let accepted = db
            .get_record(SyncTable::Products, accepted.uuid())
            .await
            .unwrap()
            .unwrap();
        let rejected = db
            .get_record(SyncTable::Products, rejected.uuid())
            .await
            .unwrap()
            .unwrap();
        assert!(!accepted.is_dirty());
        assert!(rejected.is_dirty());
        assert_eq!(rejected.fields["name"], json!("Stove"));

        let conflicts = db.list_conflicts(Some(ConflictStatus::Pending), 10).await.unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].record_uuid, rejected.uuid());
        assert_eq!(conflicts[0].local_data["name"], json!("Stove"));
        assert_eq!(conflicts[0].server_data["name"], json!("Camp Stove"));
        assert_eq!(conflicts[0].conflict_reason, "stale revision");
    }

    #[tokio::test]
    async fn pushing_twice_does_not_duplicate_conflicts() {
        let db = DatabaseService::open_in_memory().unwrap();
        let rejected = create_product(&db, "Stove").await;
        let transport = Arc::new(FakeTransport::default());
        let response = PushResponse {
            processed: 0,
            conflicts: vec![PushConflict {
                table: "products".to_string(),
                uuid: rejected.uuid().to_string(),
                server_data: None,
                reason: None,
            }],
        };
        let notifier = Arc::new(RecordingNotifier::default());
        let push = task(&db, &transport, &notifier);

        transport.set_push_response(response);
        push.run().await;
        let second = push.run().await;

        assert_eq!(second, TaskOutcome::Idle);
        assert_eq!(transport.push_calls(), 1);
        let conflicts = db.list_conflicts(None, 10).await.unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].conflict_reason, DEFAULT_PUSH_CONFLICT_REASON);
        assert_eq!(
            db.with_db(|db| SqliteConflictRepository::new(db.connection()).count_pending())
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn second_push_without_changes_is_idle() {
        let db = DatabaseService::open_in_memory().unwrap();
        create_product(&db, "Tent").await;
        let transport = Arc::new(FakeTransport::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let push = task(&db, &transport, &notifier);

        push.run().await;
        let second = push.run().await;

        assert_eq!(second, TaskOutcome::Idle);
        assert_eq!(transport.push_calls(), 1);
    }

    #[tokio::test]
    async fn edit_during_push_stays_dirty() {
        let db = DatabaseService::open_in_memory().unwrap();
        let product = create_product(&db, "Tent").await;
        let transport = Arc::new(FakeTransport::default());
        let editor = db.clone();
        let uuid = product.uuid();
        transport.on_push(move || {
            let editor = editor.clone();
            async move {
                editor
                    .update_record(SyncTable::Products, uuid, fields(json!({"price": 99.5})))
                    .await
                    .unwrap();
            }
        });
        let notifier = Arc::new(RecordingNotifier::default());

        let outcome = task(&db, &transport, &notifier).run().await;

        assert_eq!(
            outcome,
            TaskOutcome::Completed {
                synced: 0,
                conflicts: 0
            }
        );
        let record = db
            .get_record(SyncTable::Products, uuid)
            .await
            .unwrap()
            .unwrap();
        assert!(record.is_dirty());
        assert_eq!(record.fields["price"], json!(99.5));
    }

    #[tokio::test]
    async fn malformed_conflict_entries_are_skipped() {
        let db = DatabaseService::open_in_memory().unwrap();
        db.with_db(|db| {
            SqliteRecordRepository::new(db.connection())
                .create_entity(&Customer::new("Ada"))
                .map(|_| ())
        })
        .await
        .unwrap();
        let transport = Arc::new(FakeTransport::default());
        transport.set_push_response(PushResponse {
            processed: 1,
            conflicts: vec![PushConflict {
                table: "orders".to_string(),
                uuid: "not-a-uuid".to_string(),
                server_data: None,
                reason: None,
            }],
        });
        let notifier = Arc::new(RecordingNotifier::default());

        let outcome = task(&db, &transport, &notifier).run().await;

        assert_eq!(
            outcome,
            TaskOutcome::Completed {
                synced: 1,
                conflicts: 0
            }
        );
    }

    #[tokio::test]
    async fn record_with_pending_conflict_is_held_until_resolved() {
        let db = DatabaseService::open_in_memory().unwrap();
        let held = create_product(&db, "Local").await;
        let other = create_product(&db, "Tent").await;
        db.with_db(|db| {
            SqliteConflictRepository::new(db.connection()).record(
                &NewConflict {
                    table_name: SyncTable::Products,
                    record_uuid: held.uuid(),
                    local_data: held.to_wire(),
                    server_data: fields(json!({"name": "ServerV1"})),
                    conflict_reason: crate::models::PENDING_LOCAL_CHANGES_REASON.to_string(),
                },
                now_millis(),
            )
        })
        .await
        .unwrap();
        let transport = Arc::new(FakeTransport::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let push = task(&db, &transport, &notifier);

        let outcome = push.run().await;

        assert_eq!(
            outcome,
            TaskOutcome::Completed {
                synced: 1,
                conflicts: 0
            }
        );
        let sent = transport.pushed_requests();
        assert_eq!(sent[0].record_count(), 1);
        assert_eq!(sent[0].data[0].records[0]["uuid"], json!(other.uuid().to_string()));

        let record = db
            .get_record(SyncTable::Products, held.uuid())
            .await
            .unwrap()
            .unwrap();
        assert!(record.is_dirty());
        assert_eq!(record.fields["name"], json!("Local"));

        let conflict_id = db.list_conflicts(None, 10).await.unwrap()[0].id;
        db.resolve_conflict(conflict_id, ResolutionStrategy::LocalWins, "sam")
            .await
            .unwrap();
        db.update_record(SyncTable::Products, held.uuid(), fields(json!({"price": 12.0})))
            .await
            .unwrap();

        push.run().await;
        let sent = transport.pushed_requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].data[0].records[0]["uuid"], json!(held.uuid().to_string()));
    }
}
