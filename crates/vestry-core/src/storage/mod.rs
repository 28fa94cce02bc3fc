//! Storage quota accounting and time-based eviction
//!
//! Built on top of the store. Eviction only ever touches records that are
//! synced and carry no local modifications; the queue, meta, and conflict
//! tables are untouched except by a full reset.

use std::sync::Arc;
use std::time::Duration;

use rusqlite::params;

use crate::error::Result;
use crate::models::EntityKind;
use crate::store::Store;

/// Storage quota snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StorageUsage {
    /// Bytes occupied by the on-device store
    pub used: u64,
    /// Soft quota in bytes
    pub limit: u64,
    /// `used` as a percentage of `limit`
    pub percentage: f64,
}

/// Per-entity eviction counts from one [`StorageManager::evict_expired`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub per_entity: Vec<(EntityKind, u64)>,
}

impl EvictionReport {
    /// Total records evicted across all entities.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.per_entity.iter().map(|(_, count)| count).sum()
    }
}

/// Quota accounting and TTL housekeeping over the store.
pub struct StorageManager {
    store: Arc<Store>,
    limit_bytes: u64,
}

impl StorageManager {
    pub fn new(store: Arc<Store>, limit_bytes: u64) -> Self {
        Self { store, limit_bytes }
    }

    /// Current storage usage against the configured soft quota.
    ///
    /// In-memory stores have no measurable footprint and report
    /// `{0, limit, 0}`.
    pub fn usage(&self) -> StorageUsage {
        let used = self.store.disk_usage().unwrap_or(0);
        let percentage = if self.limit_bytes == 0 {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let ratio = used as f64 / self.limit_bytes as f64;
            ratio * 100.0
        };
        StorageUsage {
            used,
            limit: self.limit_bytes,
            percentage,
        }
    }

    /// Delete, per entity, every record synced before `now - ttl` that
    /// carries no local modifications. Modified records are never evicted,
    /// regardless of age.
    pub fn evict_expired(&self, ttl: Duration, now: i64) -> Result<EvictionReport> {
        let cutoff = now.saturating_sub(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX));

        let report = self.store.tx_raw(|conn, _| {
            let mut per_entity = Vec::with_capacity(EntityKind::ALL.len());
            for entity in EntityKind::ALL {
                let deleted = conn.execute(
                    "DELETE FROM records
                     WHERE entity = ? AND is_modified = 0
                       AND synced_at IS NOT NULL AND synced_at < ?",
                    params![entity.as_str(), cutoff],
                )?;
                per_entity.push((entity, u64::try_from(deleted).unwrap_or(0)));
            }
            Ok(EvictionReport { per_entity })
        })?;

        if report.total() > 0 {
            tracing::info!("Evicted {} expired cached records", report.total());
        }
        Ok(report)
    }

    /// Wipe every table including the queue, meta, and conflicts.
    ///
    /// Full logout/reset only, never routine housekeeping.
    pub fn clear_all(&self) -> Result<()> {
        self.store.tx_raw(|conn, _| {
            conn.execute_batch(
                "DELETE FROM records;
                 DELETE FROM sync_queue;
                 DELETE FROM conflicts;
                 DELETE FROM meta;",
            )?;
            Ok(())
        })?;
        tracing::info!("Cleared all offline data");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::testing::TestCrypto;
    use crate::models::CachedRecord;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const DAY_MS: i64 = 24 * 60 * 60 * 1_000;

    fn setup() -> (Arc<Store>, StorageManager) {
        let store = Arc::new(Store::open_in_memory(Arc::new(TestCrypto::new())).unwrap());
        let manager = StorageManager::new(Arc::clone(&store), 1024);
        (store, manager)
    }

    fn aged_record(entity: EntityKind, id: &str, synced_at: i64, is_modified: bool) -> CachedRecord {
        CachedRecord {
            entity,
            id: id.into(),
            payload: json!({"id": id}),
            checksum: "sum".into(),
            synced_at: Some(synced_at),
            modified_at: synced_at,
            is_modified,
            version: 1,
        }
    }

    #[test]
    fn test_evicts_only_expired_unmodified_records() {
        let (store, manager) = setup();
        let now = 100 * DAY_MS;

        // Both 10 days stale; only the unmodified one may go.
        store
            .put(&aged_record(EntityKind::Task, "stale", now - 10 * DAY_MS, false))
            .unwrap();
        store
            .put(&aged_record(EntityKind::Task, "dirty", now - 10 * DAY_MS, true))
            .unwrap();
        store
            .put(&aged_record(EntityKind::Task, "fresh", now - DAY_MS, false))
            .unwrap();

        let report = manager
            .evict_expired(Duration::from_millis(7 * DAY_MS as u64), now)
            .unwrap();

        assert_eq!(report.total(), 1);
        assert!(store.get(EntityKind::Task, "stale").unwrap().is_none());
        assert!(store.get(EntityKind::Task, "dirty").unwrap().is_some());
        assert!(store.get(EntityKind::Task, "fresh").unwrap().is_some());
    }

    #[test]
    fn test_eviction_reports_per_entity_counts() {
        let (store, manager) = setup();
        let now = 100 * DAY_MS;

        store
            .put(&aged_record(EntityKind::Event, "e1", now - 10 * DAY_MS, false))
            .unwrap();
        store
            .put(&aged_record(EntityKind::Event, "e2", now - 10 * DAY_MS, false))
            .unwrap();
        store
            .put(&aged_record(EntityKind::Account, "a1", now - 10 * DAY_MS, false))
            .unwrap();

        let report = manager
            .evict_expired(Duration::from_millis(7 * DAY_MS as u64), now)
            .unwrap();

        assert_eq!(report.total(), 3);
        let events = report
            .per_entity
            .iter()
            .find(|(entity, _)| *entity == EntityKind::Event)
            .unwrap();
        assert_eq!(events.1, 2);
    }

    #[test]
    fn test_never_synced_records_are_kept() {
        let (store, manager) = setup();
        let mut record = aged_record(EntityKind::Message, "m1", 0, false);
        record.synced_at = None;
        store.put(&record).unwrap();

        let report = manager
            .evict_expired(Duration::from_millis(0), 100 * DAY_MS)
            .unwrap();

        assert_eq!(report.total(), 0);
        assert!(store.get(EntityKind::Message, "m1").unwrap().is_some());
    }

    #[test]
    fn test_usage_falls_back_for_memory_store() {
        let (_store, manager) = setup();
        let usage = manager.usage();
        assert_eq!(usage.used, 0);
        assert_eq!(usage.limit, 1024);
        assert!(usage.percentage.abs() < f64::EPSILON);
    }

    #[test]
    fn test_usage_reports_file_footprint() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            Store::open(dir.path().join("offline.db"), Arc::new(TestCrypto::new())).unwrap(),
        );
        store
            .put(&aged_record(EntityKind::Event, "e1", 1_000, false))
            .unwrap();

        let manager = StorageManager::new(store, 1024 * 1024);
        let usage = manager.usage();
        assert!(usage.used > 0);
        assert!(usage.percentage > 0.0);
    }

    #[test]
    fn test_clear_all_wipes_every_table() {
        let (store, manager) = setup();
        store
            .put(&aged_record(EntityKind::Task, "t1", 1_000, true))
            .unwrap();
        store.set_meta("last_sync:task", "1000").unwrap();
        store
            .with_conn(|conn, _| {
                conn.execute(
                    "INSERT INTO sync_queue (id, kind, entity, entity_id, endpoint, method, created_at)
                     VALUES ('q1', 'update', 'task', 't1', '/tasks/t1', 'PUT', 10)",
                    [],
                )?;
                conn.execute(
                    "INSERT INTO conflicts (id, entity, entity_id, local_payload, server_payload,
                                            local_checksum, server_checksum, created_at)
                     VALUES ('c1', 'task', 't1', '{}', '{}', 'a', 'b', 10)",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        manager.clear_all().unwrap();

        assert_eq!(store.count(EntityKind::Task).unwrap(), 0);
        assert!(store.meta("last_sync:task").unwrap().is_none());
        let (queue, conflicts): (i64, i64) = store
            .with_conn(|conn, _| {
                Ok((
                    conn.query_row("SELECT COUNT(*) FROM sync_queue", [], |row| row.get(0))?,
                    conn.query_row("SELECT COUNT(*) FROM conflicts", [], |row| row.get(0))?,
                ))
            })
            .unwrap();
        assert_eq!(queue, 0);
        assert_eq!(conflicts, 0);
    }
}
