use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use vestry_core::{EngineConfig, EntityKind, OfflineEngine};

use crate::crypto::HostCrypto;
use crate::error::CliError;

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("VESTRY_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vestry")
        .join("offline.db")
}

/// Open the engine for a one-shot command: explicit triggers only, no
/// background interval.
pub fn open_engine(db_path: &Path) -> Result<OfflineEngine, CliError> {
    open_engine_with_ttl(db_path, None)
}

pub fn open_engine_with_ttl(
    db_path: &Path,
    cache_ttl: Option<Duration>,
) -> Result<OfflineEngine, CliError> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut config = EngineConfig::new(api_base_url()).without_auto_sync();
    if let Ok(token) = env::var("VESTRY_AUTH_TOKEN") {
        if !token.is_empty() {
            config = config.with_auth_token(token);
        }
    }
    if let Some(ttl) = cache_ttl {
        config = config.with_cache_ttl(ttl);
    }

    let crypto = Arc::new(HostCrypto::load(db_path)?);
    Ok(OfflineEngine::open(db_path, config, crypto)?)
}

fn api_base_url() -> String {
    env::var("VESTRY_API_URL").unwrap_or_else(|_| "https://api.vestry.app".to_string())
}

pub fn parse_entity(entity: &str) -> Result<EntityKind, CliError> {
    entity
        .trim()
        .to_lowercase()
        .parse()
        .map_err(|_| CliError::UnknownEntity(entity.to_string()))
}

pub fn normalize_record_id(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyRecordId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Resolve a JSON payload from an inline argument or piped stdin.
pub fn resolve_payload(inline: Option<&str>) -> Result<Value, CliError> {
    let text = match inline {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ => read_piped_stdin()?.ok_or(CliError::MissingPayload)?,
    };
    serde_json::from_str(&text).map_err(|error| CliError::InvalidPayload(error.to_string()))
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    let trimmed = buffer.trim();
    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(trimmed.to_string()))
    }
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else {
        format!("{}d ago", diff / day)
    }
}

pub fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}
