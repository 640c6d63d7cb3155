//! Task outcomes and the notification sink

use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Which background unit produced an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Push,
    Pull,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::Pull => write!(f, "pull"),
        }
    }
}

/// Result of one task run. Task boundaries never return errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Nothing to send or nothing received
    Idle,
    /// The network call succeeded and its results were applied
    Completed {
        /// Records marked synced (push) or applied locally (pull)
        synced: usize,
        /// Conflict records created or refreshed
        conflicts: usize,
    },
    /// The run failed and should be retried after `after`
    Rescheduled { after: Duration, error: String },
}

impl TaskOutcome {
    pub const fn is_rescheduled(&self) -> bool {
        matches!(self, Self::Rescheduled { .. })
    }

    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Rescheduled { after, .. } => Some(*after),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStatus {
    Idle,
    Success,
    Failed,
}

/// User-facing summary delivered after each task run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub kind: TaskKind,
    pub status: SummaryStatus,
    pub pushed: usize,
    pub pulled: usize,
    pub conflicts: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncSummary {
    pub fn from_outcome(kind: TaskKind, outcome: &TaskOutcome) -> Self {
        let mut summary = Self {
            kind,
            status: SummaryStatus::Idle,
            pushed: 0,
            pulled: 0,
            conflicts: 0,
            retry_after: None,
            error: None,
        };
        match outcome {
            TaskOutcome::Idle => {}
            TaskOutcome::Completed { synced, conflicts } => {
                summary.status = SummaryStatus::Success;
                summary.conflicts = *conflicts;
                match kind {
                    TaskKind::Push => summary.pushed = *synced,
                    TaskKind::Pull => summary.pulled = *synced,
                }
            }
            TaskOutcome::Rescheduled { after, error } => {
                summary.status = SummaryStatus::Failed;
                summary.retry_after = Some(*after);
                summary.error = Some(error.clone());
            }
        }
        summary
    }
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            SummaryStatus::Idle => write!(f, "{}: nothing to do", self.kind),
            SummaryStatus::Success => {
                let count = match self.kind {
                    TaskKind::Push => self.pushed,
                    TaskKind::Pull => self.pulled,
                };
                write!(
                    f,
                    "{}: {count} record(s) synced, {} conflict(s)",
                    self.kind, self.conflicts
                )
            }
            SummaryStatus::Failed => write!(
                f,
                "{} failed: {} (retrying in {}s)",
                self.kind,
                self.error.as_deref().unwrap_or("unknown error"),
                self.retry_after.unwrap_or_default().as_secs()
            ),
        }
    }
}

/// Receives a summary after every push and pull run
pub trait SyncNotifier: Send + Sync {
    fn notify(&self, summary: &SyncSummary);
}

/// Default sink: writes summaries to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl SyncNotifier for TracingNotifier {
    fn notify(&self, summary: &SyncSummary) {
        match summary.status {
            SummaryStatus::Idle => tracing::debug!("{summary}"),
            SummaryStatus::Success if summary.conflicts > 0 => tracing::warn!("{summary}"),
            SummaryStatus::Success => tracing::info!("{summary}"),
            SummaryStatus::Failed => tracing::warn!("{summary}"),
        }
    }
}
