//! Shared database service wrapper used by the sync tasks and the CLI.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::db::{
    ConflictRepository, Database, RecordRepository, SqliteConflictRepository,
    SqliteRecordRepository,
};
use crate::models::{ConflictStatus, FieldMap, ResolutionStrategy, SyncConflict, SyncRecord, SyncTable};
use crate::sync::{ConflictResolver, ResolutionOutcome, SyncStatusReport};
use crate::Result;

/// Thread-safe handle to one local database.
///
/// Clones share the same connection and the same sync gate, so push and pull
/// runs against one database never overlap.
#[derive(Clone)]
pub struct DatabaseService {
    db: Arc<Mutex<Database>>,
    sync_gate: Arc<Mutex<()>>,
    db_path: Option<PathBuf>,
}

impl DatabaseService {
    /// Open a database service at the given filesystem path.
    pub fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        let db = Database::open(&db_path)?;
        tracing::debug!("Opened local database at {}", db_path.display());
        Ok(Self::from_database(db, Some(db_path)))
    }

    /// Open an in-memory database service (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?, None))
    }

    fn from_database(db: Database, db_path: Option<PathBuf>) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            sync_gate: Arc::new(Mutex::new(())),
            db_path,
        }
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Run a closure against the locked database.
    pub async fn with_db<T>(&self, operation: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let db = self.db.lock().await;
        operation(&db)
    }

    /// Acquire exclusive permission to run a sync task.
    pub(crate) async fn sync_gate(&self) -> MutexGuard<'_, ()> {
        self.sync_gate.lock().await
    }

    pub async fn create_record(&self, table: SyncTable, fields: FieldMap) -> Result<SyncRecord> {
        self.with_db(|db| SqliteRecordRepository::new(db.connection()).create(table, &fields))
            .await
    }

    pub async fn update_record(
        &self,
        table: SyncTable,
        uuid: Uuid,
        changes: FieldMap,
    ) -> Result<SyncRecord> {
        self.with_db(|db| {
            SqliteRecordRepository::new(db.connection()).update(table, &uuid, &changes)
        })
        .await
    }

    pub async fn get_record(&self, table: SyncTable, uuid: Uuid) -> Result<Option<SyncRecord>> {
        self.with_db(|db| SqliteRecordRepository::new(db.connection()).get(table, &uuid))
            .await
    }

    pub async fn list_conflicts(
        &self,
        status: Option<ConflictStatus>,
        limit: usize,
    ) -> Result<Vec<SyncConflict>> {
        self.with_db(|db| SqliteConflictRepository::new(db.connection()).list(status, limit))
            .await
    }

    pub async fn get_conflict(&self, id: i64) -> Result<Option<SyncConflict>> {
        self.with_db(|db| SqliteConflictRepository::new(db.connection()).get(id))
            .await
    }

    pub async fn resolve_conflict(
        &self,
        id: i64,
        strategy: ResolutionStrategy,
        actor: &str,
    ) -> Result<ResolutionOutcome> {
        self.with_db(|db| ConflictResolver::new(db.connection()).resolve(id, strategy, actor))
            .await
    }

    pub async fn ignore_conflict(&self, id: i64, actor: &str) -> Result<ResolutionOutcome> {
        self.with_db(|db| ConflictResolver::new(db.connection()).ignore(id, actor))
            .await
    }

    /// Dirty counts, pending conflicts and sync bookkeeping
    pub async fn status(&self) -> Result<SyncStatusReport> {
        self.with_db(|db| SyncStatusReport::load(db.connection()))
            .await
    }
}
