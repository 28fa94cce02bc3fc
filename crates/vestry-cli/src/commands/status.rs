use std::path::Path;

use serde::Serialize;

use crate::commands::common::{format_timestamp, open_engine};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct StatusItem {
    records: Vec<RecordCount>,
    pending_mutations: u64,
    ready_mutations: u64,
    dead_mutations: u64,
    unresolved_conflicts: u64,
    storage_used_bytes: u64,
    storage_limit_bytes: u64,
    storage_percentage: f64,
}

#[derive(Debug, Serialize)]
struct RecordCount {
    entity: String,
    count: u64,
    last_sync: Option<String>,
}

pub fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path)?;
    let stats = engine.stats()?;

    if as_json {
        let item = StatusItem {
            records: stats
                .records
                .iter()
                .zip(&stats.last_sync)
                .map(|((entity, count), (_, last_sync))| RecordCount {
                    entity: entity.to_string(),
                    count: *count,
                    last_sync: last_sync.map(format_timestamp),
                })
                .collect(),
            pending_mutations: stats.pending_mutations,
            ready_mutations: stats.ready_mutations,
            dead_mutations: stats.dead_mutations,
            unresolved_conflicts: stats.unresolved_conflicts,
            storage_used_bytes: stats.usage.used,
            storage_limit_bytes: stats.usage.limit,
            storage_percentage: stats.usage.percentage,
        };
        println!("{}", serde_json::to_string_pretty(&item)?);
        return Ok(());
    }

    println!("Cached records:");
    for ((entity, count), (_, last_sync)) in stats.records.iter().zip(&stats.last_sync) {
        let synced = last_sync.map_or_else(|| "never synced".to_string(), format_timestamp);
        println!("  {entity:<8}  {count:>6}  last sync: {synced}");
    }

    println!(
        "Queue: {} pending ({} ready, {} dead)",
        stats.pending_mutations, stats.ready_mutations, stats.dead_mutations
    );
    println!("Conflicts awaiting adjudication: {}", stats.unresolved_conflicts);
    println!(
        "Storage: {} / {} bytes ({:.1}%)",
        stats.usage.used, stats.usage.limit, stats.usage.percentage
    );

    Ok(())
}
