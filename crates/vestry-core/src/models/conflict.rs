//! Write-conflict record model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::EntityKind;

/// A unique identifier for a conflict record, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConflictId(Uuid);

impl ConflictId {
    /// Create a new unique conflict ID using UUID v7
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

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ConflictId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// How a conflict was adjudicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// The locally modified payload becomes canonical
    Local,
    /// The server payload becomes canonical
    Server,
    /// A caller-supplied merge becomes canonical
    Merged,
}

impl Resolution {
    /// Stable name used in storage rows and log output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Server => "server",
            Self::Merged => "merged",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "server" => Ok(Self::Server),
            "merged" => Ok(Self::Merged),
            other => Err(format!("unknown resolution: {other}")),
        }
    }
}

/// A detected divergence between a locally modified record and the server's
/// current state, awaiting adjudication.
///
/// Conflict records are an audit trail: resolution marks them resolved but
/// never deletes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub id: ConflictId,
    pub entity: EntityKind,
    pub entity_id: String,
    /// Local payload at detection time
    pub local_payload: Value,
    /// Server payload at detection time
    pub server_payload: Value,
    pub local_checksum: String,
    pub server_checksum: String,
    pub created_at: i64,
    /// Set exactly once; the record is immutable afterwards
    pub resolved_at: Option<i64>,
    pub resolution: Option<Resolution>,
}

impl ConflictRecord {
    /// Whether this conflict has already been adjudicated.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_round_trip() {
        for resolution in [Resolution::Local, Resolution::Server, Resolution::Merged] {
            let parsed: Resolution = resolution.as_str().parse().unwrap();
            assert_eq!(parsed, resolution);
        }
        assert!("newest".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_conflict_id_parse() {
        let id = ConflictId::new();
        let parsed: ConflictId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
