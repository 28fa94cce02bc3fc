//! Cached entity record model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Entity families mirrored from the membership API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Account,
    Event,
    Task,
    Message,
}

impl EntityKind {
    /// All entity kinds, in eviction/reporting order.
    pub const ALL: [Self; 4] = [Self::Account, Self::Event, Self::Task, Self::Message];

    /// Stable name used in storage rows and log output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Event => "event",
            Self::Task => "task",
            Self::Message => "message",
        }
    }

    /// REST collection path segment for this entity.
    #[must_use]
    pub const fn api_path(self) -> &'static str {
        match self {
            Self::Account => "accounts",
            Self::Event => "events",
            Self::Task => "tasks",
            Self::Message => "messages",
        }
    }

    /// Whether payloads carry personal data and must be encrypted at rest.
    #[must_use]
    pub const fn is_sensitive(self) -> bool {
        matches!(self, Self::Account | Self::Message)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "account" => Ok(Self::Account),
            "event" => Ok(Self::Event),
            "task" => Ok(Self::Task),
            "message" => Ok(Self::Message),
            other => Err(format!("unknown entity kind: {other}")),
        }
    }
}

/// Locally persisted snapshot of a server entity with sync metadata.
///
/// `payload` is always the canonical decrypted value in memory; the store
/// handles ciphertext routing for sensitive entity kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRecord {
    /// Entity family this record belongs to
    pub entity: EntityKind,
    /// Server-facing entity identifier
    pub id: String,
    /// Canonical entity state
    pub payload: Value,
    /// Digest of the canonical payload, used to detect divergence
    pub checksum: String,
    /// Last successful sync timestamp (unix ms), if ever synced
    pub synced_at: Option<i64>,
    /// Last local mutation timestamp (unix ms)
    pub modified_at: i64,
    /// True while local changes await delivery; such records are never
    /// evicted by TTL
    pub is_modified: bool,
    /// Increments by exactly 1 on every local mutation
    pub version: i64,
}

impl CachedRecord {
    /// Build a record from freshly fetched server state.
    #[must_use]
    pub fn from_server(
        entity: EntityKind,
        id: impl Into<String>,
        payload: Value,
        checksum: impl Into<String>,
        now: i64,
    ) -> Self {
        Self {
            entity,
            id: id.into(),
            payload,
            checksum: checksum.into(),
            synced_at: Some(now),
            modified_at: now,
            is_modified: false,
            version: 1,
        }
    }
}
