use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use stockroom_core::sync::{
    HttpSyncClient, PullTask, PushTask, SummaryStatus, SyncNotifier, SyncScheduler, SyncSummary,
    TaskOutcome,
};
use stockroom_core::SyncConfig;

use crate::cli::SyncCommands;
use crate::commands::common::{open_database, resolve_sync_config};
use crate::error::CliError;

/// Prints each summary as it arrives
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleNotifier;

impl SyncNotifier for ConsoleNotifier {
    fn notify(&self, summary: &SyncSummary) {
        match summary.status {
            SummaryStatus::Failed => eprintln!("{summary}"),
            SummaryStatus::Idle | SummaryStatus::Success => println!("{summary}"),
        }
    }
}

pub async fn run_sync(
    command: SyncCommands,
    profile: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let mut config = resolve_sync_config(profile)?;
    if let SyncCommands::Watch {
        interval: Some(secs),
    } = command
    {
        config = watch_config(config, secs)?;
    }

    let db = open_database(db_path)?;
    let transport = Arc::new(HttpSyncClient::new(&config)?);
    let notifier: Arc<dyn SyncNotifier> = Arc::new(ConsoleNotifier);

    match command {
        SyncCommands::Push => {
            let outcome = PushTask::new(db, transport, &config, notifier).run().await;
            ensure_completed(&outcome)
        }
        SyncCommands::Pull => {
            let outcome = PullTask::new(db, transport, &config, notifier).run().await;
            ensure_completed(&outcome)
        }
        SyncCommands::Run => {
            let cycle = SyncScheduler::new(db, transport, &config, notifier)
                .run_once()
                .await;
            ensure_completed(&cycle.pull)?;
            ensure_completed(&cycle.push)
        }
        SyncCommands::Watch { .. } => {
            println!(
                "Syncing every {}s. Press Ctrl-C to stop.",
                config.sync_interval.as_secs()
            );
            let handle = SyncScheduler::new(db, transport, &config, notifier).spawn();
            tokio::signal::ctrl_c().await?;
            println!("Stopping after the current pass...");
            handle.shutdown().await;
            Ok(())
        }
    }
}

pub fn watch_config(config: SyncConfig, interval_secs: u64) -> Result<SyncConfig, CliError> {
    if interval_secs == 0 {
        return Err(CliError::Config(
            "interval must be greater than zero".to_string(),
        ));
    }
    Ok(config.with_sync_interval(Duration::from_secs(interval_secs)))
}

/// One-shot commands exit non-zero when the pass was rescheduled
pub fn ensure_completed(outcome: &TaskOutcome) -> Result<(), CliError> {
    match outcome {
        TaskOutcome::Rescheduled { error, .. } => Err(CliError::SyncFailed(error.clone())),
        TaskOutcome::Idle | TaskOutcome::Completed { .. } => Ok(()),
    }
}
