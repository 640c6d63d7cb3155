//! Database layer for Stockroom

mod conflict_repository;
mod connection;
mod migrations;
mod record_repository;
mod sync_state_repository;

pub use conflict_repository::{ConflictRepository, RecordedConflict, SqliteConflictRepository};
pub use connection::Database;
pub use record_repository::{parse_uuid_value, RecordRepository, SqliteRecordRepository};
pub use sync_state_repository::{SqliteSyncStateRepository, SyncStateRepository};
