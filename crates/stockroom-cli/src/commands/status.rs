use std::path::Path;

use stockroom_core::util::now_millis;

use crate::commands::common::{format_status_lines, open_database};
use crate::error::CliError;

pub async fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let report = db.status().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for line in format_status_lines(&report, now_millis()) {
        println!("{line}");
    }
    if report.is_settled() {
        println!("Everything is in sync.");
    }
    Ok(())
}
