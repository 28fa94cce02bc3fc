use std::path::Path;

use crate::commands::common::{normalize_record_id, open_engine, parse_entity, resolve_payload};
use crate::error::CliError;

pub fn run_stage_create(
    entity: &str,
    id: &str,
    payload: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let entity = parse_entity(entity)?;
    let id = normalize_record_id(id)?;
    let payload = resolve_payload(payload)?;

    let engine = open_engine(db_path)?;
    let record = engine.stage_create(entity, id, payload)?;
    println!("Staged create of {entity}/{} (version {})", record.id, record.version);
    Ok(())
}

pub fn run_stage_update(
    entity: &str,
    id: &str,
    payload: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let entity = parse_entity(entity)?;
    let id = normalize_record_id(id)?;
    let payload = resolve_payload(payload)?;

    let engine = open_engine(db_path)?;
    let record = engine.stage_update(entity, &id, payload)?;
    println!("Staged update of {entity}/{id} (version {})", record.version);
    Ok(())
}

pub fn run_stage_delete(entity: &str, id: &str, db_path: &Path) -> Result<(), CliError> {
    let entity = parse_entity(entity)?;
    let id = normalize_record_id(id)?;

    let engine = open_engine(db_path)?;
    engine.stage_delete(entity, &id)?;
    println!("Staged delete of {entity}/{id}");
    Ok(())
}
