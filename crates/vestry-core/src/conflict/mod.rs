//! Write-conflict detection and adjudication
//!
//! A conflict exists only when a sync attempt finds the server diverged from
//! a record that still carries local modifications. Unmodified records are
//! overwritten by server state silently. Resolution is applied exactly once,
//! inside a single store transaction covering both the conflict row and the
//! cached record.

use std::str::FromStr;
use std::sync::Arc;

use rusqlite::{params, Connection};
use serde_json::Value;

use crate::crypto::{checksum_of, Crypto};
use crate::error::{Error, Result};
use crate::models::{CachedRecord, ConflictId, ConflictRecord, EntityKind, Resolution};
use crate::store::{get_record, put_record, Store};
use crate::util::now_ms;

/// Detects divergence and applies caller-chosen resolutions.
pub struct ConflictResolver {
    store: Arc<Store>,
}

impl ConflictResolver {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Compare the server's checksum against the cached record.
    ///
    /// Records a conflict (and returns it) only when the record is currently
    /// modified locally and the fresh digests differ; otherwise returns
    /// `None` and the server value simply wins.
    pub fn detect(
        &self,
        entity: EntityKind,
        entity_id: &str,
        server_checksum: &str,
        server_payload: &Value,
    ) -> Result<Option<ConflictRecord>> {
        self.store.tx_raw(|conn, crypto| {
            let Some(record) = get_record(conn, crypto, entity, entity_id)? else {
                return Ok(None);
            };
            if !record.is_modified {
                return Ok(None);
            }

            let local_checksum = checksum_of(crypto, &record.payload);
            if local_checksum == server_checksum {
                return Ok(None);
            }

            let conflict = ConflictRecord {
                id: ConflictId::new(),
                entity,
                entity_id: entity_id.to_string(),
                local_payload: record.payload,
                server_payload: server_payload.clone(),
                local_checksum,
                server_checksum: server_checksum.to_string(),
                created_at: now_ms(),
                resolved_at: None,
                resolution: None,
            };
            insert_conflict(conn, crypto, &conflict)?;

            tracing::info!(
                "Conflict detected on {entity}/{entity_id}: local {} vs server {}",
                conflict.local_checksum,
                conflict.server_checksum
            );
            Ok(Some(conflict))
        })
    }

    /// Apply an adjudication to the underlying record and mark the conflict
    /// resolved, atomically. Rejects a second resolution of the same id.
    pub fn resolve(
        &self,
        id: &ConflictId,
        resolution: Resolution,
        merged_payload: Option<Value>,
    ) -> Result<CachedRecord> {
        if resolution == Resolution::Merged && merged_payload.is_none() {
            return Err(Error::InvalidInput(
                "merged resolution requires a merged payload".into(),
            ));
        }

        self.store.tx_raw(|conn, crypto| {
            let conflict = get_conflict(conn, crypto, id)?
                .ok_or_else(|| Error::NotFound(format!("conflict {id}")))?;
            if conflict.is_resolved() {
                return Err(Error::InvalidInput(format!(
                    "conflict {id} is already resolved"
                )));
            }

            let chosen = match resolution {
                Resolution::Local => conflict.local_payload.clone(),
                Resolution::Server => conflict.server_payload.clone(),
                // Checked above.
                Resolution::Merged => merged_payload.clone().unwrap_or(Value::Null),
            };

            let now = now_ms();
            let checksum = checksum_of(crypto, &chosen);
            let record = match get_record(conn, crypto, conflict.entity, &conflict.entity_id)? {
                Some(mut existing) => {
                    existing.payload = chosen;
                    existing.checksum = checksum;
                    existing.synced_at = Some(now);
                    existing.is_modified = false;
                    existing
                }
                None => CachedRecord::from_server(
                    conflict.entity,
                    conflict.entity_id.clone(),
                    chosen,
                    checksum,
                    now,
                ),
            };
            put_record(conn, crypto, &record)?;
            mark_resolved(conn, id, resolution, now)?;

            tracing::info!(
                "Resolved conflict {id} on {}/{} as {resolution}",
                conflict.entity,
                conflict.entity_id
            );
            Ok(record)
        })
    }

    /// All conflicts awaiting adjudication, oldest first.
    pub fn list_unresolved(&self) -> Result<Vec<ConflictRecord>> {
        self.store.with_conn(|conn, crypto| {
            conflicts_where(conn, crypto, "resolved_at IS NULL")
        })
    }

    /// Number of conflicts awaiting adjudication.
    pub fn unresolved_count(&self) -> Result<u64> {
        self.store.with_conn(|conn, _| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM conflicts WHERE resolved_at IS NULL",
                [],
                |row| row.get(0),
            )?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
    }

    /// Fetch one conflict by id.
    pub fn get(&self, id: &ConflictId) -> Result<Option<ConflictRecord>> {
        self.store.with_conn(|conn, crypto| get_conflict(conn, crypto, id))
    }
}

fn encode_conflict_payload(
    crypto: &dyn Crypto,
    entity: EntityKind,
    payload: &Value,
) -> Result<String> {
    let text = serde_json::to_string(payload)?;
    if entity.is_sensitive() {
        crypto.encrypt(&text)
    } else {
        Ok(text)
    }
}

fn decode_conflict_payload(
    crypto: &dyn Crypto,
    entity: EntityKind,
    stored: &str,
) -> Result<Value> {
    let text = if entity.is_sensitive() {
        crypto.decrypt(stored)?
    } else {
        stored.to_string()
    };
    Ok(serde_json::from_str(&text)?)
}

fn insert_conflict(conn: &Connection, crypto: &dyn Crypto, conflict: &ConflictRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO conflicts (id, entity, entity_id, local_payload, server_payload,
                                local_checksum, server_checksum, created_at, resolved_at, resolution)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            conflict.id.as_str(),
            conflict.entity.as_str(),
            conflict.entity_id,
            encode_conflict_payload(crypto, conflict.entity, &conflict.local_payload)?,
            encode_conflict_payload(crypto, conflict.entity, &conflict.server_payload)?,
            conflict.local_checksum,
            conflict.server_checksum,
            conflict.created_at,
            conflict.resolved_at,
            conflict.resolution.map(Resolution::as_str),
        ],
    )?;
    Ok(())
}

fn mark_resolved(
    conn: &Connection,
    id: &ConflictId,
    resolution: Resolution,
    resolved_at: i64,
) -> Result<()> {
    let rows = conn.execute(
        "UPDATE conflicts SET resolved_at = ?, resolution = ? WHERE id = ? AND resolved_at IS NULL",
        params![resolved_at, resolution.as_str(), id.as_str()],
    )?;
    if rows == 0 {
        return Err(Error::InvalidInput(format!(
            "conflict {id} is already resolved"
        )));
    }
    Ok(())
}

fn get_conflict(
    conn: &Connection,
    crypto: &dyn Crypto,
    id: &ConflictId,
) -> Result<Option<ConflictRecord>> {
    let mut conflicts = conflicts_where_args(conn, crypto, "id = ?", params![id.as_str()])?;
    Ok(conflicts.pop())
}

fn conflicts_where(
    conn: &Connection,
    crypto: &dyn Crypto,
    clause: &str,
) -> Result<Vec<ConflictRecord>> {
    conflicts_where_args(conn, crypto, clause, params![])
}

type RawConflictRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    i64,
    Option<i64>,
    Option<String>,
);

fn conflicts_where_args(
    conn: &Connection,
    crypto: &dyn Crypto,
    clause: &str,
    args: &[&dyn rusqlite::types::ToSql],
) -> Result<Vec<ConflictRecord>> {
    let sql = format!(
        "SELECT id, entity, entity_id, local_payload, server_payload,
                local_checksum, server_checksum, created_at, resolved_at, resolution
         FROM conflicts WHERE {clause} ORDER BY created_at ASC, id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt
        .query_map(args, |row| {
            Ok::<RawConflictRow, rusqlite::Error>((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
                row.get(8)?,
                row.get(9)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut conflicts = Vec::with_capacity(rows.len());
    for (
        id,
        entity,
        entity_id,
        local_stored,
        server_stored,
        local_checksum,
        server_checksum,
        created_at,
        resolved_at,
        resolution,
    ) in rows
    {
        let parsed = (|| -> Result<ConflictRecord> {
            let entity = EntityKind::from_str(&entity).map_err(Error::InvalidInput)?;
            Ok(ConflictRecord {
                id: ConflictId::from_str(&id).map_err(|e| Error::InvalidInput(e.to_string()))?,
                entity,
                entity_id,
                local_payload: decode_conflict_payload(crypto, entity, &local_stored)?,
                server_payload: decode_conflict_payload(crypto, entity, &server_stored)?,
                local_checksum,
                server_checksum,
                created_at,
                resolved_at,
                resolution: resolution
                    .map(|r| Resolution::from_str(&r).map_err(Error::InvalidInput))
                    .transpose()?,
            })
        })();
        match parsed {
            Ok(conflict) => conflicts.push(conflict),
            Err(error) => {
                tracing::warn!("Skipping undecodable conflict {id}: {error}");
            }
        }
    }

    Ok(conflicts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::testing::TestCrypto;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn setup() -> (Arc<Store>, ConflictResolver) {
        let store = Arc::new(Store::open_in_memory(Arc::new(TestCrypto::new())).unwrap());
        let resolver = ConflictResolver::new(Arc::clone(&store));
        (store, resolver)
    }

    fn modified_record(entity: EntityKind, id: &str, payload: Value) -> CachedRecord {
        let checksum = checksum_of(&TestCrypto::new(), &payload);
        CachedRecord {
            entity,
            id: id.into(),
            payload,
            checksum,
            synced_at: Some(500),
            modified_at: 900,
            is_modified: true,
            version: 2,
        }
    }

    #[test]
    fn test_detect_records_single_conflict_with_both_digests() {
        let (store, resolver) = setup();
        let local = json!({"name": "Ana", "phone": "111"});
        let record = modified_record(EntityKind::Account, "7", local.clone());
        store.put(&record).unwrap();

        let server = json!({"name": "Ana", "phone": "222"});
        let server_checksum = checksum_of(&TestCrypto::new(), &server);
        let conflict = resolver
            .detect(EntityKind::Account, "7", &server_checksum, &server)
            .unwrap()
            .unwrap();

        assert_eq!(conflict.local_checksum, record.checksum);
        assert_eq!(conflict.server_checksum, server_checksum);
        assert_eq!(conflict.local_payload, local);
        assert_eq!(conflict.server_payload, server);
        assert_eq!(resolver.list_unresolved().unwrap().len(), 1);
    }

    #[test]
    fn test_detect_is_silent_for_unmodified_records() {
        let (store, resolver) = setup();
        let mut record = modified_record(EntityKind::Task, "t1", json!({"title": "Choir"}));
        record.is_modified = false;
        store.put(&record).unwrap();

        let outcome = resolver
            .detect(EntityKind::Task, "t1", "different", &json!({"title": "Band"}))
            .unwrap();
        assert!(outcome.is_none());
        assert_eq!(resolver.unresolved_count().unwrap(), 0);
    }

    #[test]
    fn test_detect_is_silent_when_checksums_agree() {
        let (store, resolver) = setup();
        let payload = json!({"title": "Bulletin"});
        let record = modified_record(EntityKind::Task, "t1", payload.clone());
        store.put(&record).unwrap();

        let outcome = resolver
            .detect(EntityKind::Task, "t1", &record.checksum, &payload)
            .unwrap();
        assert!(outcome.is_none());
    }

    #[test]
    fn test_detect_is_silent_without_cached_record() {
        let (_store, resolver) = setup();
        let outcome = resolver
            .detect(EntityKind::Event, "ghost", "sum", &json!({}))
            .unwrap();
        assert!(outcome.is_none());
    }

    fn detected(resolver: &ConflictResolver, store: &Store) -> ConflictRecord {
        let record = modified_record(EntityKind::Account, "7", json!({"name": "local"}));
        store.put(&record).unwrap();
        let server = json!({"name": "server"});
        let server_checksum = checksum_of(&TestCrypto::new(), &server);
        resolver
            .detect(EntityKind::Account, "7", &server_checksum, &server)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_resolve_local_restores_local_payload() {
        let (store, resolver) = setup();
        let conflict = detected(&resolver, &store);

        let record = resolver
            .resolve(&conflict.id, Resolution::Local, None)
            .unwrap();

        assert_eq!(record.payload["name"], "local");
        assert!(!record.is_modified);
        assert_eq!(record.checksum, conflict.local_checksum);
        assert!(resolver.list_unresolved().unwrap().is_empty());
    }

    #[test]
    fn test_resolve_server_adopts_server_payload() {
        let (store, resolver) = setup();
        let conflict = detected(&resolver, &store);

        let record = resolver
            .resolve(&conflict.id, Resolution::Server, None)
            .unwrap();

        assert_eq!(record.payload["name"], "server");
        assert_eq!(record.checksum, conflict.server_checksum);
        let stored = store.get(EntityKind::Account, "7").unwrap().unwrap();
        assert_eq!(stored.payload["name"], "server");
    }

    #[test]
    fn test_resolve_merged_requires_payload() {
        let (store, resolver) = setup();
        let conflict = detected(&resolver, &store);

        let rejected = resolver.resolve(&conflict.id, Resolution::Merged, None);
        assert!(matches!(rejected, Err(Error::InvalidInput(_))));
        // Nothing mutated: the conflict is still open.
        assert_eq!(resolver.unresolved_count().unwrap(), 1);

        let merged = json!({"name": "local", "note": "kept both"});
        let record = resolver
            .resolve(&conflict.id, Resolution::Merged, Some(merged.clone()))
            .unwrap();
        assert_eq!(record.payload, merged);
    }

    #[test]
    fn test_resolve_twice_is_rejected() {
        let (store, resolver) = setup();
        let conflict = detected(&resolver, &store);

        resolver
            .resolve(&conflict.id, Resolution::Server, None)
            .unwrap();
        let second = resolver.resolve(&conflict.id, Resolution::Local, None);
        assert!(matches!(second, Err(Error::InvalidInput(_))));

        // First resolution stands.
        let stored = store.get(EntityKind::Account, "7").unwrap().unwrap();
        assert_eq!(stored.payload["name"], "server");
    }

    #[test]
    fn test_resolve_unknown_conflict() {
        let (_store, resolver) = setup();
        let missing = resolver.resolve(&ConflictId::new(), Resolution::Server, None);
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_conflict_payloads_encrypted_at_rest() {
        let (store, resolver) = setup();
        let conflict = detected(&resolver, &store);

        let (local_stored, server_stored): (String, String) = store
            .with_conn(|conn, _| {
                Ok(conn.query_row(
                    "SELECT local_payload, server_payload FROM conflicts WHERE id = ?",
                    params![conflict.id.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?)
            })
            .unwrap();

        assert!(!local_stored.contains("local"));
        assert!(!server_stored.contains("server"));
    }
}
