use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use vestry_core::{QueueItem, QueueItemId};

use crate::commands::common::{format_relative_time, open_engine, short_id};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct QueueListItem {
    id: String,
    kind: String,
    entity: String,
    entity_id: String,
    endpoint: String,
    method: String,
    priority: i64,
    created_at: i64,
    retry_count: u32,
    next_retry_at: i64,
    last_error: Option<String>,
}

pub fn run_queue(dead_only: bool, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path)?;
    let items = if dead_only {
        engine.dead_items()?
    } else {
        engine.pending_items()?
    };

    if as_json {
        let json_items = items.iter().map(queue_to_list_item).collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if items.is_empty() {
        if dead_only {
            println!("No dead queue items.");
        } else {
            println!("Mutation queue is empty.");
        }
        return Ok(());
    }

    let now_ms = Utc::now().timestamp_millis();
    for item in &items {
        let retry = if item.retry_count == 0 {
            String::new()
        } else {
            format!("  retries={}", item.retry_count)
        };
        let error = item
            .last_error
            .as_ref()
            .map_or_else(String::new, |error| format!("  last error: {error}"));
        println!(
            "{:<13}  p{}  {:<24}  {}{retry}{error}",
            short_id(&item.id.to_string()),
            item.priority,
            item.label(),
            format_relative_time(item.created_at, now_ms)
        );
    }
    Ok(())
}

pub fn run_revive(id: &str, db_path: &Path) -> Result<(), CliError> {
    let item_id: QueueItemId = id
        .trim()
        .parse()
        .map_err(|_| CliError::InvalidQueueItemId(id.to_string()))?;

    let engine = open_engine(db_path)?;
    engine.revive(&item_id)?;
    println!("Revived queue item {item_id}; it will be retried on the next sync.");
    Ok(())
}

fn queue_to_list_item(item: &QueueItem) -> QueueListItem {
    QueueListItem {
        id: item.id.to_string(),
        kind: item.kind.to_string(),
        entity: item.entity.to_string(),
        entity_id: item.entity_id.clone(),
        endpoint: item.endpoint.clone(),
        method: item.method.to_string(),
        priority: item.priority,
        created_at: item.created_at,
        retry_count: item.retry_count,
        next_retry_at: item.next_retry_at,
        last_error: item.last_error.clone(),
    }
}
