use std::path::Path;

use stockroom_core::models::ResolutionStrategy;
use stockroom_core::sync::ResolutionOutcome;

use crate::cli::{ConflictCommands, ConflictFilter};
use crate::commands::common::{
    conflict_to_item, format_conflict_detail, format_conflict_lines, open_database, resolve_actor,
    ConflictListItem,
};
use crate::error::CliError;

pub async fn run_conflicts(command: ConflictCommands, db_path: &Path) -> Result<(), CliError> {
    match command {
        ConflictCommands::List {
            status,
            limit,
            json,
        } => run_conflicts_list(status, limit, json, db_path).await,
        ConflictCommands::Show { id, json } => run_conflicts_show(id, json, db_path).await,
        ConflictCommands::Resolve {
            id,
            strategy,
            actor,
        } => run_conflicts_resolve(id, strategy.into(), actor, db_path).await,
        ConflictCommands::Ignore { id, actor } => run_conflicts_ignore(id, actor, db_path).await,
    }
}

pub async fn run_conflicts_list(
    filter: ConflictFilter,
    limit: usize,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let conflicts = db.list_conflicts(filter.status(), limit).await?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(conflict_to_item)
            .collect::<Vec<ConflictListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No conflicts recorded.");
        return Ok(());
    }

    for line in format_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_conflicts_show(id: i64, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let conflict = db
        .get_conflict(id)
        .await?
        .ok_or(CliError::ConflictNotFound(id))?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&conflict)?);
        return Ok(());
    }

    for line in format_conflict_detail(&conflict) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_conflicts_resolve(
    id: i64,
    strategy: ResolutionStrategy,
    actor: Option<String>,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let actor = resolve_actor(actor);
    let outcome = db.resolve_conflict(id, strategy, &actor).await?;
    report_outcome(outcome)
}

pub async fn run_conflicts_ignore(
    id: i64,
    actor: Option<String>,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let actor = resolve_actor(actor);
    let outcome = db.ignore_conflict(id, &actor).await?;
    report_outcome(outcome)
}

fn report_outcome(outcome: ResolutionOutcome) -> Result<(), CliError> {
    let conflict = outcome_to_result(outcome)?;
    match conflict.resolution_strategy {
        Some(strategy) => println!(
            "Conflict #{} resolved with {strategy}; {} {} is now in sync.",
            conflict.id, conflict.table_name, conflict.record_uuid
        ),
        None => println!(
            "Conflict #{} ignored; {} {} was left unchanged.",
            conflict.id, conflict.table_name, conflict.record_uuid
        ),
    }
    Ok(())
}

pub fn outcome_to_result(
    outcome: ResolutionOutcome,
) -> Result<stockroom_core::models::SyncConflict, CliError> {
    match outcome {
        ResolutionOutcome::Resolved(conflict) | ResolutionOutcome::Ignored(conflict) => {
            Ok(conflict)
        }
        ResolutionOutcome::AlreadyTerminal { id, status } => {
            Err(CliError::ConflictClosed { id, status })
        }
        ResolutionOutcome::ConflictNotFound(id) => Err(CliError::ConflictNotFound(id)),
        ResolutionOutcome::RecordMissing { table, uuid } => {
            Err(CliError::RecordMissing { table, uuid })
        }
    }
}
