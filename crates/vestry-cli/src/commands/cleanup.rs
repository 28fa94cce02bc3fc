use std::path::Path;
use std::time::Duration;

use crate::commands::common::{open_engine, open_engine_with_ttl};
use crate::error::CliError;

pub fn run_cleanup(ttl_days: Option<u64>, db_path: &Path) -> Result<(), CliError> {
    let ttl = ttl_days.map(|days| Duration::from_secs(days * 24 * 60 * 60));
    let engine = open_engine_with_ttl(db_path, ttl)?;

    let report = engine.cleanup()?;
    if report.total() == 0 {
        println!("Nothing to evict.");
        return Ok(());
    }

    for (entity, count) in &report.per_entity {
        if *count > 0 {
            println!("  {entity:<8}  {count} evicted");
        }
    }
    println!("Evicted {} expired cached records.", report.total());
    Ok(())
}

pub fn run_reset(confirmed: bool, db_path: &Path) -> Result<(), CliError> {
    if !confirmed {
        return Err(CliError::ResetNotConfirmed);
    }

    let engine = open_engine(db_path)?;
    engine.clear_all()?;
    println!("All offline data wiped (records, queue, meta, conflicts).");
    Ok(())
}
