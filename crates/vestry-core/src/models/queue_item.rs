//! Mutation queue item model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::EntityKind;

/// A unique identifier for a queue item, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueItemId(Uuid);

impl QueueItemId {
    /// Create a new unique queue item ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for QueueItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueueItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueItemId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The intent of a pending mutation.
///
/// Priority is derived from the kind so destructive intents flush first and
/// cannot be shadowed by stale creates or updates on the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl MutationKind {
    /// Delivery priority tier: lower flushes first.
    #[must_use]
    pub const fn priority(self) -> i64 {
        match self {
            Self::Delete => 1,
            Self::Create => 3,
            Self::Update => 5,
        }
    }

    /// Stable name used in storage rows and log output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown mutation kind: {other}")),
        }
    }
}

/// HTTP verb used to deliver a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Wire representation of the verb.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(format!("unknown http method: {other}")),
        }
    }
}

/// Delivery state of a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    /// Awaiting delivery (possibly backing off between retries)
    Pending,
    /// Retry budget exhausted; excluded from delivery until revived
    Dead,
}

impl QueueStatus {
    /// Stable name used in storage rows.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Dead => "dead",
        }
    }
}

impl FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "dead" => Ok(Self::Dead),
            other => Err(format!("unknown queue status: {other}")),
        }
    }
}

/// Caller-supplied fields of a mutation awaiting enqueue.
#[derive(Debug, Clone)]
pub struct MutationDraft {
    pub kind: MutationKind,
    pub entity: EntityKind,
    pub entity_id: String,
    /// Request body; `None` for deletes
    pub payload: Option<Value>,
    /// Record checksum at enqueue time, if the record existed
    pub original_checksum: Option<String>,
    pub endpoint: String,
    pub method: HttpMethod,
}

/// One pending outbound mutation awaiting delivery to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: QueueItemId,
    pub kind: MutationKind,
    pub entity: EntityKind,
    pub entity_id: String,
    pub payload: Option<Value>,
    pub original_checksum: Option<String>,
    pub endpoint: String,
    pub method: HttpMethod,
    /// Enqueue timestamp (unix ms); FIFO tiebreaker within a priority tier
    pub created_at: i64,
    pub retry_count: u32,
    /// Earliest timestamp (unix ms) this item may be delivered again;
    /// monotonically non-decreasing across failures
    pub next_retry_at: i64,
    pub last_error: Option<String>,
    pub priority: i64,
    pub status: QueueStatus,
}

impl QueueItem {
    /// Materialize a draft into a persistable item.
    #[must_use]
    pub fn from_draft(draft: MutationDraft, now: i64) -> Self {
        Self {
            id: QueueItemId::new(),
            priority: draft.kind.priority(),
            kind: draft.kind,
            entity: draft.entity,
            entity_id: draft.entity_id,
            payload: draft.payload,
            original_checksum: draft.original_checksum,
            endpoint: draft.endpoint,
            method: draft.method,
            created_at: now,
            retry_count: 0,
            next_retry_at: 0,
            last_error: None,
            status: QueueStatus::Pending,
        }
    }

    /// Short human label for progress reporting, e.g. `update account/7`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}/{}", self.kind, self.entity, self.entity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(MutationKind::Delete.priority() < MutationKind::Create.priority());
        assert!(MutationKind::Create.priority() < MutationKind::Update.priority());
    }

    #[test]
    fn test_from_draft_zeroes_retry_state() {
        let draft = MutationDraft {
            kind: MutationKind::Delete,
            entity: EntityKind::Task,
            entity_id: "9".into(),
            payload: None,
            original_checksum: None,
            endpoint: "/tasks/9".into(),
            method: HttpMethod::Delete,
        };
        let item = QueueItem::from_draft(draft, 1_000);
        assert_eq!(item.retry_count, 0);
        assert_eq!(item.next_retry_at, 0);
        assert_eq!(item.priority, 1);
        assert_eq!(item.status, QueueStatus::Pending);
        assert_eq!(item.label(), "delete task/9");
    }

    #[test]
    fn test_method_round_trip() {
        for method in [
            HttpMethod::Post,
            HttpMethod::Put,
            HttpMethod::Patch,
            HttpMethod::Delete,
        ] {
            let parsed: HttpMethod = method.as_str().parse().unwrap();
            assert_eq!(parsed, method);
        }
    }
}
