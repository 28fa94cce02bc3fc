//! Store schema migrations
//!
//! Each version declares its layout change as an upgrade function applied in
//! order inside its own transaction. Upgrade functions are idempotent and
//! never drop rows with unsynced local changes.

use rusqlite::{params, Connection, Transaction};

use crate::error::{Error, Result};

/// Current schema version
const CURRENT_VERSION: i32 = 3;

type Migration = fn(&Transaction<'_>) -> Result<()>;

/// Upgrade functions, applied in order from the store's version to the latest.
const MIGRATIONS: &[(i32, Migration)] = &[(1, migrate_v1), (2, migrate_v2), (3, migrate_v3)];

/// Run all pending migrations.
///
/// A failure here is fatal at open: the store cannot be trusted until its
/// shape is known.
pub fn run(conn: &mut Connection) -> Result<()> {
    let version = get_version(conn)?;

    for (target, migration) in MIGRATIONS {
        if version < *target {
            apply(conn, *target, *migration)?;
        }
    }

    Ok(())
}

fn apply(conn: &mut Connection, version: i32, migration: Migration) -> Result<()> {
    let tx = conn.transaction()?;
    migration(&tx).map_err(|error| Error::Migration(format!("version {version}: {error}")))?;
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?)",
        params![version],
    )?;
    tx.commit()?;

    tracing::info!("Migrated store to version {version}");
    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
        [],
        |row| row.get::<_, i32>(0).map(|flag| flag != 0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Add a column only if the table does not already have it, keeping upgrade
/// functions re-runnable after a partial rollout.
fn add_column_if_missing(
    tx: &Transaction<'_>,
    table: &str,
    column: &str,
    definition: &str,
) -> Result<()> {
    let present: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM pragma_table_info(?) WHERE name = ?)",
        params![table, column],
        |row| row.get::<_, i32>(0).map(|flag| flag != 0),
    )?;

    if !present {
        tx.execute_batch(&format!("ALTER TABLE {table} ADD COLUMN {column} {definition}"))?;
    }

    Ok(())
}

/// Migration to version 1: initial schema (records, queue, meta)
fn migrate_v1(tx: &Transaction<'_>) -> Result<()> {
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );
        CREATE TABLE IF NOT EXISTS records (
            entity TEXT NOT NULL,
            id TEXT NOT NULL,
            payload TEXT NOT NULL,
            synced_at INTEGER,
            modified_at INTEGER NOT NULL,
            is_modified INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (entity, id)
        );
        CREATE INDEX IF NOT EXISTS idx_records_synced ON records(entity, synced_at);
        CREATE INDEX IF NOT EXISTS idx_records_modified ON records(entity, is_modified);
        CREATE TABLE IF NOT EXISTS sync_queue (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            entity TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            payload TEXT,
            original_checksum TEXT,
            endpoint TEXT NOT NULL,
            method TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            last_error TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_queue_entity ON sync_queue(entity, entity_id);
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );",
    )?;

    Ok(())
}

/// Migration to version 2: checksum/version sync metadata and conflict log
///
/// Legacy rows get `version = 1` and an empty checksum; an empty checksum
/// means "unknown" and is recomputed on the next write, so no row is ever
/// misreported as diverged.
fn migrate_v2(tx: &Transaction<'_>) -> Result<()> {
    add_column_if_missing(tx, "records", "checksum", "TEXT NOT NULL DEFAULT ''")?;
    add_column_if_missing(tx, "records", "version", "INTEGER NOT NULL DEFAULT 1")?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS conflicts (
            id TEXT PRIMARY KEY,
            entity TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            local_payload TEXT NOT NULL,
            server_payload TEXT NOT NULL,
            local_checksum TEXT NOT NULL,
            server_checksum TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            resolved_at INTEGER,
            resolution TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_conflicts_entity ON conflicts(entity, entity_id);
        CREATE INDEX IF NOT EXISTS idx_conflicts_unresolved ON conflicts(resolved_at);",
    )?;

    Ok(())
}

/// Migration to version 3: retry scheduling and dead-letter state on the queue
///
/// Backfills `priority` from the stored mutation kind so pre-existing items
/// keep the delete-first delivery order.
fn migrate_v3(tx: &Transaction<'_>) -> Result<()> {
    add_column_if_missing(tx, "sync_queue", "next_retry_at", "INTEGER NOT NULL DEFAULT 0")?;
    add_column_if_missing(tx, "sync_queue", "priority", "INTEGER NOT NULL DEFAULT 0")?;
    add_column_if_missing(
        tx,
        "sync_queue",
        "status",
        "TEXT NOT NULL DEFAULT 'pending'",
    )?;

    tx.execute_batch(
        "UPDATE sync_queue
         SET priority = CASE kind
             WHEN 'delete' THEN 1
             WHEN 'create' THEN 3
             ELSE 5
         END
         WHERE priority = 0;
         CREATE INDEX IF NOT EXISTS idx_queue_ready
             ON sync_queue(status, next_retry_at, priority, created_at);",
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_migrations() {
        let mut conn = setup();
        run(&mut conn).unwrap();

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let mut conn = setup();
        run(&mut conn).unwrap();
        run(&mut conn).unwrap(); // Should not fail

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_upgrade_preserves_unsynced_legacy_rows() {
        let mut conn = setup();

        // Build a v1-shaped store with one locally modified row.
        let tx = conn.transaction().unwrap();
        migrate_v1(&tx).unwrap();
        tx.execute(
            "INSERT INTO schema_version (version) VALUES (1)",
            [],
        )
        .unwrap();
        tx.execute(
            "INSERT INTO records (entity, id, payload, synced_at, modified_at, is_modified)
             VALUES ('task', '7', '{}', NULL, 5, 1)",
            [],
        )
        .unwrap();
        tx.commit().unwrap();

        run(&mut conn).unwrap();

        let (is_modified, version, checksum): (i32, i64, String) = conn
            .query_row(
                "SELECT is_modified, version, checksum FROM records WHERE entity = 'task' AND id = '7'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();

        assert_eq!(is_modified, 1);
        assert_eq!(version, 1);
        assert_eq!(checksum, "");
    }

    #[test]
    fn test_queue_priority_backfill() {
        let mut conn = setup();

        let tx = conn.transaction().unwrap();
        migrate_v1(&tx).unwrap();
        tx.execute("INSERT INTO schema_version (version) VALUES (1)", [])
            .unwrap();
        tx.execute(
            "INSERT INTO sync_queue (id, kind, entity, entity_id, endpoint, method, created_at)
             VALUES ('a', 'delete', 'task', '1', '/tasks/1', 'DELETE', 10),
                    ('b', 'update', 'task', '2', '/tasks/2', 'PUT', 10)",
            [],
        )
        .unwrap();
        tx.commit().unwrap();

        run(&mut conn).unwrap();

        let delete_priority: i64 = conn
            .query_row("SELECT priority FROM sync_queue WHERE id = 'a'", [], |row| {
                row.get(0)
            })
            .unwrap();
        let update_priority: i64 = conn
            .query_row("SELECT priority FROM sync_queue WHERE id = 'b'", [], |row| {
                row.get(0)
            })
            .unwrap();

        assert_eq!(delete_priority, 1);
        assert_eq!(update_priority, 5);
    }
}
