//! Process-wide bookkeeping entries

use serde::{Deserialize, Serialize};

use super::EntityKind;

/// One key/value bookkeeping row; no TTL of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaEntry {
    pub key: String,
    pub value: String,
    /// Last write timestamp (unix ms)
    pub updated_at: i64,
}

/// Meta key holding the last successful sync timestamp for an entity.
#[must_use]
pub fn last_sync_key(entity: EntityKind) -> String {
    format!("last_sync:{entity}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_sync_key_is_per_entity() {
        assert_eq!(last_sync_key(EntityKind::Account), "last_sync:account");
        assert_ne!(
            last_sync_key(EntityKind::Event),
            last_sync_key(EntityKind::Task)
        );
    }
}
