//! Transactional, schema-versioned local store
//!
//! Single shared mutable resource of the engine: every component reads and
//! writes through an explicitly constructed [`Store`] handle. Sensitive
//! entity payloads are routed through the crypto collaborator before
//! persistence and after read; a record that fails to decrypt is skipped,
//! never the whole read.

mod migrations;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use rusqlite::{params, Connection, OptionalExtension};

use crate::crypto::Crypto;
use crate::error::Result;
use crate::models::{CachedRecord, EntityKind, MetaEntry};

/// Handle to the device-local SQLite store.
pub struct Store {
    conn: Mutex<Connection>,
    crypto: Arc<dyn Crypto>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open a store at the given path, creating it if it doesn't exist.
    ///
    /// Runs migrations; a migration failure aborts the open.
    pub fn open(path: impl AsRef<Path>, crypto: Arc<dyn Crypto>) -> Result<Self> {
        let mut conn = Connection::open(path.as_ref())?;
        configure(&conn);
        migrations::run(&mut conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            crypto,
            path: Some(path.as_ref().to_path_buf()),
        })
    }

    /// Open an in-memory store (useful for testing).
    pub fn open_in_memory(crypto: Arc<dyn Crypto>) -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        configure(&conn);
        migrations::run(&mut conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            crypto,
            path: None,
        })
    }

    /// Fetch one record, or `None` when absent or undecodable.
    pub fn get(&self, entity: EntityKind, id: &str) -> Result<Option<CachedRecord>> {
        self.with_conn(|conn, crypto| get_record(conn, crypto, entity, id))
    }

    /// Atomic upsert of one record.
    pub fn put(&self, record: &CachedRecord) -> Result<()> {
        self.with_conn(|conn, crypto| put_record(conn, crypto, record))
    }

    /// Upsert a batch in a single transaction; partial failure rolls the
    /// whole batch back.
    pub fn bulk_put(&self, records: &[CachedRecord]) -> Result<()> {
        self.tx_raw(|conn, crypto| {
            for record in records {
                put_record(conn, crypto, record)?;
            }
            Ok(())
        })
    }

    /// Delete one record. Returns whether a row existed.
    pub fn delete(&self, entity: EntityKind, id: &str) -> Result<bool> {
        self.with_conn(|conn, _| delete_record(conn, entity, id))
    }

    /// All decodable records of an entity matching the predicate.
    pub fn query(
        &self,
        entity: EntityKind,
        predicate: impl Fn(&CachedRecord) -> bool,
    ) -> Result<Vec<CachedRecord>> {
        let records = self.with_conn(|conn, crypto| query_records(conn, crypto, entity))?;
        Ok(records.into_iter().filter(|r| predicate(r)).collect())
    }

    /// Number of cached records for an entity.
    pub fn count(&self, entity: EntityKind) -> Result<u64> {
        self.with_conn(|conn, _| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM records WHERE entity = ?",
                params![entity.as_str()],
                |row| row.get(0),
            )?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
    }

    /// Run record operations with all-or-nothing semantics across tables.
    pub fn transaction<T>(&self, f: impl FnOnce(&StoreTx<'_>) -> Result<T>) -> Result<T> {
        self.tx_raw(|conn, crypto| f(&StoreTx { conn, crypto }))
    }

    /// Fetch one bookkeeping entry.
    pub fn meta(&self, key: &str) -> Result<Option<MetaEntry>> {
        self.with_conn(|conn, _| get_meta(conn, key))
    }

    /// Upsert one bookkeeping entry, stamping `updated_at`.
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.with_conn(|conn, _| put_meta(conn, key, value, crate::util::now_ms()))
    }

    /// Size of the database file plus WAL sidecars, when backed by disk.
    pub fn disk_usage(&self) -> Option<u64> {
        let path = self.path.as_ref()?;
        let mut total = std::fs::metadata(path).ok()?.len();
        for suffix in ["-wal", "-shm"] {
            let mut sidecar = path.as_os_str().to_owned();
            sidecar.push(suffix);
            if let Ok(meta) = std::fs::metadata(PathBuf::from(sidecar)) {
                total += meta.len();
            }
        }
        Some(total)
    }

    /// Run a closure against the live connection.
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection, &dyn Crypto) -> Result<T>,
    ) -> Result<T> {
        let guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        f(&guard, self.crypto.as_ref())
    }

    /// Run a closure inside a transaction; an error rolls everything back.
    pub(crate) fn tx_raw<T>(
        &self,
        f: impl FnOnce(&Connection, &dyn Crypto) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = guard.transaction()?;
        let out = f(&tx, self.crypto.as_ref())?;
        tx.commit()?;
        Ok(out)
    }
}

/// Typed record operations inside a [`Store::transaction`] closure.
pub struct StoreTx<'a> {
    conn: &'a Connection,
    crypto: &'a dyn Crypto,
}

impl StoreTx<'_> {
    pub fn get(&self, entity: EntityKind, id: &str) -> Result<Option<CachedRecord>> {
        get_record(self.conn, self.crypto, entity, id)
    }

    pub fn put(&self, record: &CachedRecord) -> Result<()> {
        put_record(self.conn, self.crypto, record)
    }

    pub fn delete(&self, entity: EntityKind, id: &str) -> Result<bool> {
        delete_record(self.conn, entity, id)
    }
}

/// Configure SQLite for local client workloads.
fn configure(conn: &Connection) {
    // Pragmas are advisory; in-memory databases reject some of them.
    conn.execute_batch("PRAGMA journal_mode = WAL;").ok();
    conn.execute_batch("PRAGMA synchronous = NORMAL;").ok();
    conn.execute_batch("PRAGMA foreign_keys = ON;").ok();
    conn.execute_batch("PRAGMA cache_size = 10000;").ok();
}

/// Serialize a payload for persistence, encrypting sensitive entities.
fn encode_payload(
    crypto: &dyn Crypto,
    entity: EntityKind,
    payload: &serde_json::Value,
) -> Result<String> {
    let text = serde_json::to_string(payload)?;
    if entity.is_sensitive() {
        crypto.encrypt(&text)
    } else {
        Ok(text)
    }
}

/// Decode a persisted payload, decrypting sensitive entities.
fn decode_payload(
    crypto: &dyn Crypto,
    entity: EntityKind,
    stored: &str,
) -> Result<serde_json::Value> {
    let text = if entity.is_sensitive() {
        crypto.decrypt(stored)?
    } else {
        stored.to_string()
    };
    Ok(serde_json::from_str(&text)?)
}

pub(crate) fn get_record(
    conn: &Connection,
    crypto: &dyn Crypto,
    entity: EntityKind,
    id: &str,
) -> Result<Option<CachedRecord>> {
    let row = conn
        .query_row(
            "SELECT id, payload, checksum, synced_at, modified_at, is_modified, version
             FROM records WHERE entity = ? AND id = ?",
            params![entity.as_str(), id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i32>(5)? != 0,
                    row.get::<_, i64>(6)?,
                ))
            },
        )
        .optional()?;

    let Some((id, stored, checksum, synced_at, modified_at, is_modified, version)) = row else {
        return Ok(None);
    };

    match decode_payload(crypto, entity, &stored) {
        Ok(payload) => Ok(Some(CachedRecord {
            entity,
            id,
            payload,
            checksum,
            synced_at,
            modified_at,
            is_modified,
            version,
        })),
        Err(error) => {
            tracing::warn!("Skipping undecodable {entity} record {id}: {error}");
            Ok(None)
        }
    }
}

pub(crate) fn put_record(
    conn: &Connection,
    crypto: &dyn Crypto,
    record: &CachedRecord,
) -> Result<()> {
    let stored = encode_payload(crypto, record.entity, &record.payload)?;
    conn.execute(
        "INSERT INTO records (entity, id, payload, checksum, synced_at, modified_at, is_modified, version)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (entity, id) DO UPDATE SET
             payload = excluded.payload,
             checksum = excluded.checksum,
             synced_at = excluded.synced_at,
             modified_at = excluded.modified_at,
             is_modified = excluded.is_modified,
             version = excluded.version",
        params![
            record.entity.as_str(),
            record.id,
            stored,
            record.checksum,
            record.synced_at,
            record.modified_at,
            i32::from(record.is_modified),
            record.version,
        ],
    )?;
    Ok(())
}

pub(crate) fn delete_record(conn: &Connection, entity: EntityKind, id: &str) -> Result<bool> {
    let rows = conn.execute(
        "DELETE FROM records WHERE entity = ? AND id = ?",
        params![entity.as_str(), id],
    )?;
    Ok(rows > 0)
}

pub(crate) fn get_meta(conn: &Connection, key: &str) -> Result<Option<MetaEntry>> {
    let entry = conn
        .query_row(
            "SELECT key, value, updated_at FROM meta WHERE key = ?",
            params![key],
            |row| {
                Ok(MetaEntry {
                    key: row.get(0)?,
                    value: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(entry)
}

pub(crate) fn put_meta(conn: &Connection, key: &str, value: &str, now: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO meta (key, value, updated_at) VALUES (?, ?, ?)
         ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value, now],
    )?;
    Ok(())
}

pub(crate) fn query_records(
    conn: &Connection,
    crypto: &dyn Crypto,
    entity: EntityKind,
) -> Result<Vec<CachedRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, payload, checksum, synced_at, modified_at, is_modified, version
         FROM records WHERE entity = ? ORDER BY modified_at DESC",
    )?;

    let rows = stmt
        .query_map(params![entity.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<i64>>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i32>(5)? != 0,
                row.get::<_, i64>(6)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut records = Vec::with_capacity(rows.len());
    for (id, stored, checksum, synced_at, modified_at, is_modified, version) in rows {
        match decode_payload(crypto, entity, &stored) {
            Ok(payload) => records.push(CachedRecord {
                entity,
                id,
                payload,
                checksum,
                synced_at,
                modified_at,
                is_modified,
                version,
            }),
            Err(error) => {
                tracing::warn!("Skipping undecodable {entity} record {id}: {error}");
            }
        }
    }

    Ok(records)
}
