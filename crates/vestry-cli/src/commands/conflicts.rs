use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use vestry_core::ConflictId;

use crate::cli::ResolutionArg;
use crate::commands::common::{
    format_timestamp, open_engine, read_piped_stdin, short_id,
};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct ConflictListItem {
    id: String,
    entity: String,
    entity_id: String,
    local_checksum: String,
    server_checksum: String,
    created_at: String,
    local_payload: Value,
    server_payload: Value,
}

pub fn run_conflicts(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path)?;
    let conflicts = engine.conflicts()?;

    if as_json {
        let items = conflicts
            .into_iter()
            .map(|conflict| ConflictListItem {
                id: conflict.id.to_string(),
                entity: conflict.entity.to_string(),
                entity_id: conflict.entity_id,
                local_checksum: conflict.local_checksum,
                server_checksum: conflict.server_checksum,
                created_at: format_timestamp(conflict.created_at),
                local_payload: conflict.local_payload,
                server_payload: conflict.server_payload,
            })
            .collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No conflicts awaiting adjudication.");
        return Ok(());
    }

    for conflict in conflicts {
        println!(
            "{}  {}  {}/{}  local={} server={}",
            short_id(&conflict.id.to_string()),
            format_timestamp(conflict.created_at),
            conflict.entity,
            conflict.entity_id,
            short_id(&conflict.local_checksum),
            short_id(&conflict.server_checksum)
        );
    }
    println!("Resolve with: vestry resolve <id> <local|server|merged>");
    Ok(())
}

pub fn run_resolve(
    id: &str,
    resolution: ResolutionArg,
    payload: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let conflict_id: ConflictId = id
        .trim()
        .parse()
        .map_err(|_| CliError::InvalidConflictId(id.to_string()))?;

    let merged_payload = resolve_merged_payload(resolution, payload)?;

    let engine = open_engine(db_path)?;
    let record = engine.resolve_conflict(&conflict_id, resolution.into_resolution(), merged_payload)?;
    println!(
        "Resolved conflict as {}; {}/{} is now at version {}",
        resolution_label(resolution),
        record.entity,
        record.id,
        record.version
    );
    Ok(())
}

/// A merged resolution takes its payload inline or from stdin; the other
/// resolutions ignore any payload.
fn resolve_merged_payload(
    resolution: ResolutionArg,
    payload: Option<&str>,
) -> Result<Option<Value>, CliError> {
    if resolution != ResolutionArg::Merged {
        return Ok(None);
    }

    let text = match payload {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ => read_piped_stdin()?.ok_or(CliError::MissingPayload)?,
    };
    let value =
        serde_json::from_str(&text).map_err(|error| CliError::InvalidPayload(error.to_string()))?;
    Ok(Some(value))
}

const fn resolution_label(resolution: ResolutionArg) -> &'static str {
    match resolution {
        ResolutionArg::Local => "local",
        ResolutionArg::Server => "server",
        ResolutionArg::Merged => "merged",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_payload_required_only_for_merged() {
        assert!(resolve_merged_payload(ResolutionArg::Local, None)
            .unwrap()
            .is_none());
        assert!(resolve_merged_payload(ResolutionArg::Server, Some("{}"))
            .unwrap()
            .is_none());

        let merged = resolve_merged_payload(ResolutionArg::Merged, Some(r#"{"a": 1}"#))
            .unwrap()
            .unwrap();
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merged_payload_must_be_valid_json() {
        assert!(matches!(
            resolve_merged_payload(ResolutionArg::Merged, Some("{broken")),
            Err(CliError::InvalidPayload(_))
        ));
    }
}
