//! Offline-first synchronization with the authoritative server.
//!
//! [`PushTask`] uploads dirty records, [`PullTask`] applies server updates,
//! and [`ConflictResolver`] collapses the divergences either task records.
//! [`SyncScheduler`] runs both on a timer against one [`DatabaseService`].
//!
//! [`DatabaseService`]: crate::services::DatabaseService

mod client;
mod notify;
mod protocol;
mod pull;
mod push;
mod resolver;
mod scheduler;
mod status;
#[cfg(test)]
mod testing;

pub use client::{HttpSyncClient, SyncTransport};
pub use notify::{SummaryStatus, SyncNotifier, SyncSummary, TaskKind, TaskOutcome, TracingNotifier};
pub use protocol::{
    split_wire_record, PullResponse, PushConflict, PushRequest, PushResponse, TableBatch,
};
pub use pull::PullTask;
pub use push::PushTask;
pub use resolver::{differing_fields, merge_snapshots, ConflictResolver, ResolutionOutcome};
pub use scheduler::{SyncCycle, SyncHandle, SyncScheduler};
pub use status::{SyncStatusReport, TableStatus};
