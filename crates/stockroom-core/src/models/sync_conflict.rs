//! Sync conflict model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record::FieldMap;
use super::table::SyncTable;
use crate::error::Error;

/// Reason recorded when a pull meets a record with unpushed local edits
pub const PENDING_LOCAL_CHANGES_REASON: &str =
    "local changes pending while server update received";

/// Lifecycle state of a conflict. `Resolved` and `Ignored` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStatus {
    #[default]
    Pending,
    Resolved,
    Ignored,
}

impl ConflictStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Ignored => "ignored",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ConflictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "resolved" => Ok(Self::Resolved),
            "ignored" => Ok(Self::Ignored),
            other => Err(Error::InvalidInput(format!("unknown conflict status: {other}"))),
        }
    }
}

/// Rule used to collapse a conflict into one authoritative record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Keep the local data as-is
    LocalWins,
    /// Overwrite the local record with the server snapshot
    ServerWins,
    /// Field-level union, local value wins where both sides are set
    Merge,
}

impl ResolutionStrategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LocalWins => "local_wins",
            Self::ServerWins => "server_wins",
            Self::Merge => "merge",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "local_wins" | "local" => Ok(Self::LocalWins),
            "server_wins" | "server" => Ok(Self::ServerWins),
            "merge" => Ok(Self::Merge),
            other => Err(Error::InvalidInput(format!(
                "unknown resolution strategy: {other}"
            ))),
        }
    }
}

/// Detected divergence between a local record and the server's copy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict row identifier
    pub id: i64,
    /// Entity table in conflict
    pub table_name: SyncTable,
    /// Stable identity of the conflicting record
    pub record_uuid: Uuid,
    /// Local field snapshot at detection time
    pub local_data: FieldMap,
    /// Server field snapshot at detection time
    pub server_data: FieldMap,
    /// Human-readable cause
    pub conflict_reason: String,
    pub status: ConflictStatus,
    /// Set only when resolved
    pub resolution_strategy: Option<ResolutionStrategy>,
    /// Acting user or agent
    pub resolved_by: Option<String>,
    /// Set once, on leaving `pending` (Unix ms)
    pub resolved_at: Option<i64>,
    /// Detection timestamp (Unix ms)
    pub created_at: i64,
}

/// Conflict data captured at detection time, before it is persisted
#[derive(Debug, Clone, PartialEq)]
pub struct NewConflict {
    pub table_name: SyncTable,
    pub record_uuid: Uuid,
    pub local_data: FieldMap,
    pub server_data: FieldMap,
    pub conflict_reason: String,
}
