use std::env;
use std::path::{Path, PathBuf};

use serde::Serialize;
use stockroom_core::models::{FieldMap, SyncConflict};
use stockroom_core::sync::{differing_fields, SyncStatusReport};
use stockroom_core::util::{format_timestamp, normalize_text_option};
use stockroom_core::{DatabaseService, SyncConfig};

use crate::config_profiles::{CliProfilesConfig, AUTH_TOKEN_ENV};
use crate::error::CliError;

pub const DB_PATH_ENV: &str = "STOCKROOM_DB_PATH";

#[derive(Debug, Serialize)]
pub struct ConflictListItem {
    pub id: i64,
    pub table: String,
    pub record_uuid: String,
    pub status: String,
    pub reason: String,
    pub strategy: Option<String>,
    pub resolved_by: Option<String>,
    pub created_at: i64,
    pub created_at_iso: String,
    pub resolved_at: Option<i64>,
}

pub fn conflict_to_item(conflict: &SyncConflict) -> ConflictListItem {
    ConflictListItem {
        id: conflict.id,
        table: conflict.table_name.to_string(),
        record_uuid: conflict.record_uuid.to_string(),
        status: conflict.status.to_string(),
        reason: conflict.conflict_reason.clone(),
        strategy: conflict
            .resolution_strategy
            .map(|strategy| strategy.to_string()),
        resolved_by: conflict.resolved_by.clone(),
        created_at: conflict.created_at,
        created_at_iso: format_timestamp(conflict.created_at),
        resolved_at: conflict.resolved_at,
    }
}

pub fn format_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            let uuid = conflict.record_uuid.to_string();
            let short_uuid = uuid.chars().take(8).collect::<String>();
            format!(
                "#{:<5} {:<8}  {:<22} {short_uuid}  {}  {}",
                conflict.id,
                conflict.status,
                conflict.table_name,
                format_timestamp(conflict.created_at),
                conflict.conflict_reason
            )
        })
        .collect()
}

/// Side-by-side view of the fields that differ
pub fn format_conflict_detail(conflict: &SyncConflict) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Conflict #{} on {} {}",
            conflict.id, conflict.table_name, conflict.record_uuid
        ),
        format!("Status:   {}", conflict.status),
        format!("Reason:   {}", conflict.conflict_reason),
        format!("Detected: {}", format_timestamp(conflict.created_at)),
    ];
    if let Some(resolved_at) = conflict.resolved_at {
        lines.push(format!(
            "Closed:   {} by {} ({})",
            format_timestamp(resolved_at),
            conflict.resolved_by.as_deref().unwrap_or("unknown"),
            conflict
                .resolution_strategy
                .map_or_else(|| "ignored".to_string(), |strategy| strategy.to_string())
        ));
    }

    let fields = differing_fields(&conflict.local_data, &conflict.server_data);
    if fields.is_empty() {
        lines.push("Snapshots are identical.".to_string());
    } else {
        lines.push(format!("{:<16} {:<28} {}", "FIELD", "LOCAL", "SERVER"));
        for field in fields {
            lines.push(format!(
                "{field:<16} {:<28} {}",
                render_field(&conflict.local_data, &field),
                render_field(&conflict.server_data, &field)
            ));
        }
    }
    lines
}

fn render_field(snapshot: &FieldMap, field: &str) -> String {
    match snapshot.get(field) {
        None => "-".to_string(),
        Some(serde_json::Value::String(text)) => text.clone(),
        Some(value) => value.to_string(),
    }
}

pub fn format_status_lines(report: &SyncStatusReport, now_ms: i64) -> Vec<String> {
    let mut lines = Vec::new();
    for table in &report.tables {
        lines.push(format!("{:<22} {} unsynced", table.table, table.dirty));
    }
    lines.push(format!("Pending conflicts      {}", report.pending_conflicts));
    lines.push(format!(
        "Last push              {}",
        format_optional_time(report.last_push_at, now_ms)
    ));
    lines.push(format!(
        "Last pull              {}",
        format_optional_time(report.last_pull_at, now_ms)
    ));
    lines
}

fn format_optional_time(timestamp_ms: Option<i64>, now_ms: i64) -> String {
    timestamp_ms.map_or_else(
        || "never".to_string(),
        |timestamp| {
            format!(
                "{} ({})",
                format_timestamp(timestamp),
                format_relative_time(timestamp, now_ms)
            )
        },
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

/// `--actor`, then the login name, then a fixed fallback
pub fn resolve_actor(explicit: Option<String>) -> String {
    explicit
        .and_then(|actor| normalize_text_option(Some(actor)))
        .or_else(|| normalize_text_option(env::var("USER").ok()))
        .or_else(|| normalize_text_option(env::var("USERNAME").ok()))
        .unwrap_or_else(|| "stockroom-cli".to_string())
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stockroom")
        .join("stockroom.db")
}

pub fn open_database(path: &Path) -> Result<DatabaseService, CliError> {
    Ok(DatabaseService::open_path(path)?)
}

/// Load the selected profile and turn it into an engine config.
pub fn resolve_sync_config(profile: Option<&str>) -> Result<SyncConfig, CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile);
    let env_token = env::var(AUTH_TOKEN_ENV).ok();

    let sync_config = config
        .profile(&profile_name)
        .and_then(|profile| profile.sync_config(env_token.as_deref()))
        .ok_or_else(|| CliError::SyncNotConfigured(profile_name.clone()))?;
    sync_config.validate()?;
    tracing::debug!("Using profile '{profile_name}': {sync_config:?}");
    Ok(sync_config)
}
