use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::commands::common::{
    format_relative_time, open_engine, parse_entity, read_piped_stdin, short_id,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct RecordListItem {
    id: String,
    version: i64,
    is_modified: bool,
    synced_at: Option<i64>,
    modified_at: i64,
    checksum: String,
    payload: Value,
}

pub fn run_list(entity: &str, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let entity = parse_entity(entity)?;
    let engine = open_engine(db_path)?;
    let records = engine.records(entity)?;

    if as_json {
        let items = records
            .into_iter()
            .map(|record| RecordListItem {
                id: record.id,
                version: record.version,
                is_modified: record.is_modified,
                synced_at: record.synced_at,
                modified_at: record.modified_at,
                checksum: record.checksum,
                payload: record.payload,
            })
            .collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No cached {entity} records.");
        return Ok(());
    }

    let now_ms = Utc::now().timestamp_millis();
    for record in records {
        let state = if record.is_modified { "modified" } else { "synced" };
        println!(
            "{:<13}  v{:<3}  {state:<8}  {}",
            short_id(&record.id),
            record.version,
            format_relative_time(record.modified_at, now_ms)
        );
    }
    Ok(())
}

pub fn run_import(
    entity: &str,
    file: Option<&PathBuf>,
    db_path: &Path,
) -> Result<(), CliError> {
    let entity = parse_entity(entity)?;
    let text = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => read_piped_stdin()?.ok_or(CliError::MissingPayload)?,
    };
    let rows: Vec<Value> =
        serde_json::from_str(&text).map_err(|error| CliError::InvalidPayload(error.to_string()))?;

    let records = rows
        .into_iter()
        .map(|row| {
            let id = row
                .get("id")
                .and_then(Value::as_str)
                .map(ToString::to_string)
                .ok_or_else(|| {
                    CliError::InvalidPayload("every record needs a string `id` field".into())
                })?;
            Ok((id, row))
        })
        .collect::<Result<Vec<_>, CliError>>()?;

    let engine = open_engine(db_path)?;
    let total = u64::try_from(records.len()).unwrap_or(0);
    let cached = engine.cache_server_records(entity, &records)?;

    println!(
        "Cached {cached} of {total} {entity} records ({} skipped as locally modified)",
        total.saturating_sub(cached)
    );
    Ok(())
}
