//! Vestry CLI - operate the offline data-resilience engine
//!
//! Stage writes while offline, run sync cycles, adjudicate conflicts, and
//! keep the on-device store tidy.

mod cli;
mod commands;
mod crypto;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands, StageCommands};
use crate::commands::common::resolve_db_path;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vestry=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Status { json } => commands::status::run_status(json, &db_path)?,
        Commands::Sync => commands::sync::run_sync(&db_path).await?,
        Commands::Stage { command } => match command {
            StageCommands::Create {
                entity,
                id,
                payload,
            } => {
                commands::stage::run_stage_create(&entity, &id, payload.as_deref(), &db_path)?;
            }
            StageCommands::Update {
                entity,
                id,
                payload,
            } => {
                commands::stage::run_stage_update(&entity, &id, payload.as_deref(), &db_path)?;
            }
            StageCommands::Delete { entity, id } => {
                commands::stage::run_stage_delete(&entity, &id, &db_path)?;
            }
        },
        Commands::List { entity, json } => {
            commands::records::run_list(&entity, json, &db_path)?;
        }
        Commands::Import { entity, file } => {
            commands::records::run_import(&entity, file.as_ref(), &db_path)?;
        }
        Commands::Conflicts { json } => {
            commands::conflicts::run_conflicts(json, &db_path)?;
        }
        Commands::Resolve {
            id,
            resolution,
            payload,
        } => {
            commands::conflicts::run_resolve(&id, resolution, payload.as_deref(), &db_path)?;
        }
        Commands::Queue { dead, json } => commands::queue::run_queue(dead, json, &db_path)?,
        Commands::Revive { id } => commands::queue::run_revive(&id, &db_path)?,
        Commands::Cleanup { ttl_days } => {
            commands::cleanup::run_cleanup(ttl_days, &db_path)?;
        }
        Commands::Reset { yes } => commands::cleanup::run_reset(yes, &db_path)?,
        Commands::Completions { shell, output } => {
            commands::completions::run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use vestry_core::EntityKind;

    use crate::commands::cleanup::{run_cleanup, run_reset};
    use crate::commands::common::open_engine;
    use crate::commands::queue::run_queue;
    use crate::commands::stage::{run_stage_create, run_stage_delete, run_stage_update};
    use crate::error::CliError;

    fn test_db_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("offline.db")
    }

    #[test]
    fn stage_commands_persist_across_invocations() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = test_db_path(&dir);

        run_stage_create("task", "t1", Some(r#"{"title": "Flowers"}"#), &db_path).unwrap();
        run_stage_update("task", "t1", Some(r#"{"title": "More flowers"}"#), &db_path).unwrap();
        run_stage_delete("task", "t1", &db_path).unwrap();

        // A fresh process sees the staged backlog.
        let engine = open_engine(&db_path).unwrap();
        assert_eq!(engine.pending_count().unwrap(), 3);
        let record = engine.get(EntityKind::Task, "t1").unwrap().unwrap();
        assert!(record.is_modified);
        assert_eq!(record.version, 3);
    }

    #[test]
    fn stage_rejects_unknown_entity() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = test_db_path(&dir);

        let error = run_stage_create("congregation", "c1", Some("{}"), &db_path).unwrap_err();
        assert!(matches!(error, CliError::UnknownEntity(_)));
    }

    #[test]
    fn queue_listing_handles_empty_and_populated_states() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = test_db_path(&dir);

        run_queue(false, false, &db_path).unwrap();
        run_stage_create("event", "e1", Some(r#"{"name": "Vigil"}"#), &db_path).unwrap();
        run_queue(false, true, &db_path).unwrap();
        run_queue(true, false, &db_path).unwrap();
    }

    #[test]
    fn cleanup_with_zero_ttl_keeps_modified_records() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = test_db_path(&dir);

        run_stage_create("task", "t1", Some(r#"{"title": "Unsynced"}"#), &db_path).unwrap();
        run_cleanup(Some(0), &db_path).unwrap();

        let engine = open_engine(&db_path).unwrap();
        assert!(engine.get(EntityKind::Task, "t1").unwrap().is_some());
    }

    #[test]
    fn reset_requires_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = test_db_path(&dir);

        run_stage_create("task", "t1", Some(r#"{"title": "Doomed"}"#), &db_path).unwrap();

        let refused = run_reset(false, &db_path).unwrap_err();
        assert!(matches!(refused, CliError::ResetNotConfirmed));

        run_reset(true, &db_path).unwrap();
        let engine = open_engine(&db_path).unwrap();
        assert_eq!(engine.pending_count().unwrap(), 0);
        assert!(engine.get(EntityKind::Task, "t1").unwrap().is_none());
    }
}
