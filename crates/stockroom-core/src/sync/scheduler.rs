//! Background scheduler running pull then push on a timer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use super::client::SyncTransport;
use super::notify::{SyncNotifier, TaskOutcome};
use super::pull::PullTask;
use super::push::PushTask;
use crate::config::SyncConfig;
use crate::services::DatabaseService;

/// Outcomes of one scheduler pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCycle {
    pub pull: TaskOutcome,
    pub push: TaskOutcome,
}

impl SyncCycle {
    /// Delay before the next pass: the longest requested backoff, else `interval`
    pub fn next_delay(&self, interval: Duration) -> Duration {
        self.pull
            .retry_after()
            .into_iter()
            .chain(self.push.retry_after())
            .max()
            .unwrap_or(interval)
    }
}

pub struct SyncScheduler<T> {
    pull: PullTask<T>,
    push: PushTask<T>,
    interval: Duration,
}

impl<T: SyncTransport + 'static> SyncScheduler<T> {
    pub fn new(
        db: DatabaseService,
        transport: Arc<T>,
        config: &SyncConfig,
        notifier: Arc<dyn SyncNotifier>,
    ) -> Self {
        Self {
            pull: PullTask::new(
                db.clone(),
                Arc::clone(&transport),
                config,
                Arc::clone(&notifier),
            ),
            push: PushTask::new(db, transport, config, notifier),
            interval: config.sync_interval,
        }
    }

    /// Pull, then push.
    pub async fn run_once(&self) -> SyncCycle {
        let pull = self.pull.run().await;
        let push = self.push.run().await;
        SyncCycle { pull, push }
    }

    /// Start the loop on the tokio runtime. The first pass runs immediately.
    pub fn spawn(self) -> SyncHandle {
        let trigger = Arc::new(Notify::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run_loop(Arc::clone(&trigger), shutdown_rx));
        SyncHandle {
            trigger,
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run_loop(self, trigger: Arc<Notify>, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "Sync scheduler started (interval {}s)",
            self.interval.as_secs()
        );
        let mut delay = Duration::ZERO;

        loop {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = trigger.notified() => {
                    tracing::debug!("Manual sync triggered");
                }
                _ = shutdown.changed() => break,
            }
            if *shutdown.borrow() {
                break;
            }

            let cycle = self.run_once().await;
            delay = cycle.next_delay(self.interval);
            if cycle.pull.is_rescheduled() || cycle.push.is_rescheduled() {
                tracing::warn!("Sync pass failed, next attempt in {}s", delay.as_secs());
            }
        }

        tracing::info!("Sync scheduler stopped");
    }
}

/// Control handle for a spawned scheduler
pub struct SyncHandle {
    trigger: Arc<Notify>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Run a pass as soon as the current one (if any) finishes
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Stop after the current pass and wait for the loop to exit
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        if let Err(error) = self.task.await {
            tracing::warn!("Sync scheduler task ended abnormally: {error}");
        }
    }
}
