use std::path::Path;

use crate::commands::common::open_engine;
use crate::error::CliError;

pub async fn run_sync(db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path)?;

    let mut events = engine.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(progress) = events.recv().await {
            if let Some(item) = &progress.current_item {
                println!("[{}/{}] {item}", progress.current + 1, progress.total);
            }
        }
    });

    let report = engine.sync().await?;
    printer.abort();

    if report.skipped {
        println!("Sync skipped (offline or a cycle is already running)");
        return Ok(());
    }

    println!(
        "Sync finished: {} delivered, {} failed, {} conflicts ({} total)",
        report.delivered, report.failed, report.conflicts, report.total
    );
    if report.conflicts > 0 {
        println!("Run `vestry conflicts` to adjudicate.");
    }
    if let Some(error) = engine.progress().last_error {
        println!("Last error: {error}");
    }

    Ok(())
}
