use std::io;

use stockroom_core::models::{ConflictStatus, SyncTable};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] stockroom_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Sync is not configured for profile '{0}'. Run `stockroom config init --server-url <URL> --user-id <ID>` and set STOCKROOM_AUTH_TOKEN."
    )]
    SyncNotConfigured(String),
    #[error("Sync failed: {0}")]
    SyncFailed(String),
    #[error("Conflict not found: {0}")]
    ConflictNotFound(i64),
    #[error("Conflict {id} is already {status}")]
    ConflictClosed { id: i64, status: ConflictStatus },
    #[error("Cannot resolve: {table} record {uuid} no longer exists locally")]
    RecordMissing { table: SyncTable, uuid: Uuid },
}
