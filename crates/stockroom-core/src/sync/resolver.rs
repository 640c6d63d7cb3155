//! Conflict resolution.
//!
//! Resolution is the only way a conflict leaves `pending`. The conflict close
//! and the entity write share one transaction, so a vanished record leaves
//! the conflict pending and the entity untouched.

use rusqlite::Connection;
use serde_json::Value;
use uuid::Uuid;

use crate::db::{
    ConflictRepository, RecordRepository, SqliteConflictRepository, SqliteRecordRepository,
};
use crate::error::Result;
use crate::models::{ConflictStatus, FieldMap, ResolutionStrategy, SyncConflict, SyncTable};
use crate::util::now_millis;

/// What happened to a resolve or ignore request
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionOutcome {
    /// Conflict closed as `resolved` and the entity marked synced
    Resolved(SyncConflict),
    /// Conflict closed as `ignored`; the entity is left as it was
    Ignored(SyncConflict),
    /// The conflict was already closed; nothing was re-applied
    AlreadyTerminal { id: i64, status: ConflictStatus },
    ConflictNotFound(i64),
    /// The conflicted record no longer exists locally
    RecordMissing { table: SyncTable, uuid: Uuid },
}

impl ResolutionOutcome {
    /// True when the request changed the conflict's status
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Resolved(_) | Self::Ignored(_))
    }
}

pub struct ConflictResolver<'a> {
    conn: &'a Connection,
}

impl<'a> ConflictResolver<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Collapse a pending conflict using `strategy`, attributed to `actor`.
    pub fn resolve(
        &self,
        id: i64,
        strategy: ResolutionStrategy,
        actor: &str,
    ) -> Result<ResolutionOutcome> {
        let tx = self.conn.unchecked_transaction()?;
        let conflicts = SqliteConflictRepository::new(&tx);
        let records = SqliteRecordRepository::new(&tx);

        let conflict = match pending_conflict(&conflicts, id)? {
            Ok(conflict) => conflict,
            Err(outcome) => return Ok(outcome),
        };
        let table = conflict.table_name;
        let uuid = conflict.record_uuid;
        let now = now_millis();

        let entity_written = match strategy {
            ResolutionStrategy::LocalWins => records.mark_synced(table, &uuid, now)?,
            ResolutionStrategy::ServerWins => {
                records.apply_server_fields(table, &uuid, &conflict.server_data, now)?
            }
            ResolutionStrategy::Merge => {
                let merged = merge_snapshots(&conflict.local_data, &conflict.server_data);
                records.apply_server_fields(table, &uuid, &merged, now)?
            }
        };
        if !entity_written {
            tracing::error!("Cannot resolve conflict {id}: {table} {uuid} no longer exists");
            return Ok(ResolutionOutcome::RecordMissing { table, uuid });
        }

        if !conflicts.close(id, ConflictStatus::Resolved, Some(strategy), actor, now)? {
            return already_closed(&conflicts, id);
        }
        tx.commit()?;
        tracing::info!("Resolved conflict {id} on {table} {uuid} with {strategy}");

        Ok(ResolutionOutcome::Resolved(SyncConflict {
            status: ConflictStatus::Resolved,
            resolution_strategy: Some(strategy),
            resolved_by: Some(actor.to_string()),
            resolved_at: Some(now),
            ..conflict
        }))
    }

    /// Close a pending conflict without touching the entity.
    pub fn ignore(&self, id: i64, actor: &str) -> Result<ResolutionOutcome> {
        let conflicts = SqliteConflictRepository::new(self.conn);
        let conflict = match pending_conflict(&conflicts, id)? {
            Ok(conflict) => conflict,
            Err(outcome) => return Ok(outcome),
        };

        let now = now_millis();
        if !conflicts.close(id, ConflictStatus::Ignored, None, actor, now)? {
            return already_closed(&conflicts, id);
        }
        tracing::info!(
            "Ignored conflict {id} on {} {}",
            conflict.table_name,
            conflict.record_uuid
        );

        Ok(ResolutionOutcome::Ignored(SyncConflict {
            status: ConflictStatus::Ignored,
            resolved_by: Some(actor.to_string()),
            resolved_at: Some(now),
            ..conflict
        }))
    }
}

/// Load a conflict that may still be acted on, or the outcome explaining why not.
fn pending_conflict(
    conflicts: &impl ConflictRepository,
    id: i64,
) -> Result<std::result::Result<SyncConflict, ResolutionOutcome>> {
    let Some(conflict) = conflicts.get(id)? else {
        return Ok(Err(ResolutionOutcome::ConflictNotFound(id)));
    };
    if conflict.status.is_terminal() {
        tracing::warn!("Conflict {id} is already {}", conflict.status);
        return Ok(Err(ResolutionOutcome::AlreadyTerminal {
            id,
            status: conflict.status,
        }));
    }
    Ok(Ok(conflict))
}

fn already_closed(conflicts: &impl ConflictRepository, id: i64) -> Result<ResolutionOutcome> {
    Ok(match conflicts.get(id)? {
        Some(conflict) => ResolutionOutcome::AlreadyTerminal {
            id,
            status: conflict.status,
        },
        None => ResolutionOutcome::ConflictNotFound(id),
    })
}

/// Field-level merge of two snapshots.
///
/// A field non-null on only one side takes that side's value; when both are
/// non-null the local value wins. Server-only fields are added.
pub fn merge_snapshots(local: &FieldMap, server: &FieldMap) -> FieldMap {
    let mut merged = FieldMap::new();
    for (key, local_value) in local {
        let value = match server.get(key) {
            Some(server_value) if local_value.is_null() => server_value.clone(),
            _ => local_value.clone(),
        };
        merged.insert(key.clone(), value);
    }
    for (key, server_value) in server {
        if !merged.contains_key(key) {
            merged.insert(key.clone(), server_value.clone());
        }
    }
    merged
}

/// Keys whose values differ between two snapshots, for display
pub fn differing_fields(local: &FieldMap, server: &FieldMap) -> Vec<String> {
    let mut keys: Vec<String> = local
        .keys()
        .chain(server.keys())
        .filter(|key| {
            local.get(*key).unwrap_or(&Value::Null) != server.get(*key).unwrap_or(&Value::Null)
        })
        .cloned()
        .collect();
    keys.sort();
    keys.dedup();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{NewConflict, Syncable};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn map(value: Value) -> FieldMap {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    /// A dirty product plus a pending conflict against it
    fn conflicted_product(db: &Database, local: Value, server: Value) -> (Uuid, i64) {
        let records = SqliteRecordRepository::new(db.connection());
        let record = records.create(SyncTable::Products, &map(local.clone())).unwrap();
        let conflict = SqliteConflictRepository::new(db.connection())
            .record(
                &NewConflict {
                    table_name: SyncTable::Products,
                    record_uuid: record.uuid(),
                    local_data: map(local),
                    server_data: map(server),
                    conflict_reason: "test".to_string(),
                },
                10,
            )
            .unwrap();
        (record.uuid(), conflict.conflict.id)
    }

    #[test]
    fn merge_prefers_local_and_adds_server_only_fields() {
        let merged = merge_snapshots(
            &map(json!({"name": "A", "price": 100})),
            &map(json!({"name": "B", "category": "X"})),
        );
        assert_eq!(merged, map(json!({"name": "A", "price": 100, "category": "X"})));
    }

    #[test]
    fn merge_fills_local_nulls_from_server() {
        let merged = merge_snapshots(
            &map(json!({"name": "A", "sku": null, "price": null})),
            &map(json!({"sku": "SKU-1", "price": null})),
        );
        assert_eq!(merged, map(json!({"name": "A", "sku": "SKU-1", "price": null})));
    }

    #[test]
    fn local_wins_keeps_local_fields_and_marks_synced() {
        let db = Database::open_in_memory().unwrap();
        let (uuid, id) = conflicted_product(&db, json!({"name": "L"}), json!({"name": "S"}));

        let outcome = ConflictResolver::new(db.connection())
            .resolve(id, ResolutionStrategy::LocalWins, "alice")
            .unwrap();

        let ResolutionOutcome::Resolved(conflict) = outcome else {
            panic!("expected resolved, got {outcome:?}");
        };
        assert_eq!(conflict.status, ConflictStatus::Resolved);
        assert_eq!(conflict.resolution_strategy, Some(ResolutionStrategy::LocalWins));
        assert_eq!(conflict.resolved_by.as_deref(), Some("alice"));
        assert!(conflict.resolved_at.is_some());

        let record = SqliteRecordRepository::new(db.connection())
            .get(SyncTable::Products, &uuid)
            .unwrap()
            .unwrap();
        assert_eq!(record.fields["name"], json!("L"));
        assert!(!record.is_dirty());

        let stored = SqliteConflictRepository::new(db.connection())
            .get(id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ConflictStatus::Resolved);
    }

    #[test]
    fn server_wins_overwrites_updatable_fields_only() {
        let db = Database::open_in_memory().unwrap();
        let (uuid, id) = conflicted_product(
            &db,
            json!({"name": "L", "price": 5.0}),
            json!({"name": "S", "category": "Camping", "warehouse": "B2"}),
        );

        let outcome = ConflictResolver::new(db.connection())
            .resolve(id, ResolutionStrategy::ServerWins, "alice")
            .unwrap();
        assert!(outcome.is_applied());

        let record = SqliteRecordRepository::new(db.connection())
            .get(SyncTable::Products, &uuid)
            .unwrap()
            .unwrap();
        assert_eq!(record.fields["name"], json!("S"));
        assert_eq!(record.fields["category"], json!("Camping"));
        assert_eq!(record.fields["price"], json!(5.0));
        assert!(!record.fields.contains_key("warehouse"));
        assert!(!record.is_dirty());
    }

    #[test]
    fn merge_strategy_writes_merged_snapshot() {
        let db = Database::open_in_memory().unwrap();
        let (uuid, id) = conflicted_product(
            &db,
            json!({"name": "A", "price": 100.0}),
            json!({"name": "B", "category": "X"}),
        );

        ConflictResolver::new(db.connection())
            .resolve(id, ResolutionStrategy::Merge, "alice")
            .unwrap();

        let record = SqliteRecordRepository::new(db.connection())
            .get(SyncTable::Products, &uuid)
            .unwrap()
            .unwrap();
        assert_eq!(record.fields["name"], json!("A"));
        assert_eq!(record.fields["price"], json!(100.0));
        assert_eq!(record.fields["category"], json!("X"));
        assert!(!record.is_dirty());
    }

    #[test]
    fn terminal_conflict_is_not_reapplied() {
        let db = Database::open_in_memory().unwrap();
        let (uuid, id) = conflicted_product(&db, json!({"name": "L"}), json!({"name": "S"}));
        let resolver = ConflictResolver::new(db.connection());

        resolver.ignore(id, "alice").unwrap();
        let outcome = resolver
            .resolve(id, ResolutionStrategy::ServerWins, "bob")
            .unwrap();

        assert_eq!(
            outcome,
            ResolutionOutcome::AlreadyTerminal {
                id,
                status: ConflictStatus::Ignored
            }
        );
        let record = SqliteRecordRepository::new(db.connection())
            .get(SyncTable::Products, &uuid)
            .unwrap()
            .unwrap();
        assert_eq!(record.fields["name"], json!("L"));
        assert!(record.is_dirty());

        let again = resolver.ignore(id, "bob").unwrap();
        assert!(!again.is_applied());
    }

    #[test]
    fn ignore_leaves_entity_dirty() {
        let db = Database::open_in_memory().unwrap();
        let (uuid, id) = conflicted_product(&db, json!({"name": "L"}), json!({"name": "S"}));

        let outcome = ConflictResolver::new(db.connection())
            .ignore(id, "alice")
            .unwrap();

        let ResolutionOutcome::Ignored(conflict) = outcome else {
            panic!("expected ignored, got {outcome:?}");
        };
        assert_eq!(conflict.resolution_strategy, None);
        assert!(conflict.resolved_at.is_some());
        let record = SqliteRecordRepository::new(db.connection())
            .get(SyncTable::Products, &uuid)
            .unwrap()
            .unwrap();
        assert!(record.is_dirty());
    }

    #[test]
    fn missing_record_is_a_surfaced_failure() {
        let db = Database::open_in_memory().unwrap();
        let (uuid, id) = conflicted_product(&db, json!({"name": "L"}), json!({"name": "S"}));
        SqliteRecordRepository::new(db.connection())
            .delete(SyncTable::Products, &uuid)
            .unwrap();

        let outcome = ConflictResolver::new(db.connection())
            .resolve(id, ResolutionStrategy::LocalWins, "alice")
            .unwrap();

        assert_eq!(
            outcome,
            ResolutionOutcome::RecordMissing {
                table: SyncTable::Products,
                uuid
            }
        );
        let stored = SqliteConflictRepository::new(db.connection())
            .get(id)
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ConflictStatus::Pending);
    }

    #[test]
    fn unknown_conflict_id() {
        let db = Database::open_in_memory().unwrap();
        let outcome = ConflictResolver::new(db.connection())
            .resolve(42, ResolutionStrategy::Merge, "alice")
            .unwrap();
        assert_eq!(outcome, ResolutionOutcome::ConflictNotFound(42));
    }

    #[test]
    fn differing_fields_lists_changed_keys() {
        let keys = differing_fields(
            &map(json!({"name": "A", "price": 1})),
            &map(json!({"name": "B", "price": 1, "sku": "X"})),
        );
        assert_eq!(keys, vec!["name".to_string(), "sku".to_string()]);
    }
}
