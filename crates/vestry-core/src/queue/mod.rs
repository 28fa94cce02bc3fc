//! Ordered backlog of pending outbound mutations
//!
//! Items are persisted in the store and delivered in `(priority, created_at)`
//! order. Failures reschedule with exponential backoff plus jitter; items
//! that exhaust their retry budget park in a dead state awaiting manual
//! intervention.

use std::str::FromStr;
use std::sync::Arc;

use rand::Rng;
use rusqlite::{params, Connection};

use crate::crypto::Crypto;
use crate::error::{Error, Result};
use crate::models::{
    EntityKind, HttpMethod, MutationDraft, MutationKind, QueueItem, QueueItemId, QueueStatus,
};
use crate::util::compact_text;

/// Exponential backoff configuration with jitter to prevent synchronized
/// retry storms across many queued items.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Retry budget before an item parks as dead; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 5 * 60 * 1_000,
            max_attempts: Some(10),
        }
    }
}

impl BackoffConfig {
    /// Compute the delay for a given retry attempt.
    ///
    /// Formula: `clamp(initial * 2^retry, max) ± 25% jitter`
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> u64 {
        let exp = self
            .initial_delay_ms
            .saturating_mul(1u64.checked_shl(retry).unwrap_or(u64::MAX));
        let capped = exp.min(self.max_delay_ms).max(1);
        let spread = capped / 4;
        if spread == 0 {
            return capped;
        }
        rand::thread_rng().gen_range(capped - spread..=capped + spread)
    }

    /// Whether one more failure exhausts the retry budget.
    #[must_use]
    pub fn is_exhausted(&self, retry_count: u32) -> bool {
        self.max_attempts
            .is_some_and(|budget| retry_count >= budget)
    }
}

/// Persistent mutation queue backed by the store.
pub struct MutationQueue {
    store: Arc<crate::store::Store>,
    backoff: BackoffConfig,
}

impl MutationQueue {
    pub fn new(store: Arc<crate::store::Store>, backoff: BackoffConfig) -> Self {
        Self { store, backoff }
    }

    /// Persist a new mutation; priority derives from the kind, retry state
    /// starts zeroed. Returns the stored item with its generated id.
    pub fn enqueue(&self, draft: MutationDraft) -> Result<QueueItem> {
        let item = QueueItem::from_draft(draft, crate::util::now_ms());
        self.store
            .with_conn(|conn, crypto| insert_item(conn, crypto, &item))?;
        tracing::debug!("Enqueued {} as {}", item.label(), item.id);
        Ok(item)
    }

    /// All pending items due at `now`, in delivery order:
    /// ascending `(priority, created_at)`, stable within a tier.
    pub fn dequeue_ready(&self, now: i64) -> Result<Vec<QueueItem>> {
        self.store.with_conn(|conn, crypto| ready_items(conn, crypto, now))
    }

    /// Record a delivery failure: bump the retry count, remember the error,
    /// and either reschedule with backoff or park the item as dead.
    pub fn record_failure(&self, id: &QueueItemId, error: &str, now: i64) -> Result<QueueItem> {
        self.store.with_conn(|conn, crypto| {
            let mut item = get_item(conn, crypto, id)?
                .ok_or_else(|| Error::NotFound(format!("queue item {id}")))?;

            item.retry_count += 1;
            item.last_error = Some(compact_text(error));

            if self.backoff.is_exhausted(item.retry_count) {
                item.status = QueueStatus::Dead;
                tracing::warn!(
                    "Queue item {} ({}) exhausted {} attempts, parking as dead: {}",
                    item.id,
                    item.label(),
                    item.retry_count,
                    error
                );
            } else {
                let delay = self.backoff.delay_for_retry(item.retry_count);
                // next_retry_at never moves backwards across failures.
                item.next_retry_at = item
                    .next_retry_at
                    .max(now.saturating_add(i64::try_from(delay).unwrap_or(i64::MAX)));
                tracing::debug!(
                    "Queue item {} failed (attempt {}), retrying after {}ms",
                    item.id,
                    item.retry_count,
                    delay
                );
            }

            update_retry_state(conn, &item)?;
            Ok(item)
        })
    }

    /// Delete an item on confirmed server acknowledgement.
    pub fn remove(&self, id: &QueueItemId) -> Result<bool> {
        self.store.with_conn(|conn, _| {
            let rows = conn.execute(
                "DELETE FROM sync_queue WHERE id = ?",
                params![id.as_str()],
            )?;
            Ok(rows > 0)
        })
    }

    /// Pending items, regardless of retry schedule.
    pub fn total_count(&self) -> Result<u64> {
        self.count_by_status(QueueStatus::Pending)
    }

    /// Pending items due at `now`.
    pub fn ready_count(&self, now: i64) -> Result<u64> {
        self.store.with_conn(|conn, _| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sync_queue WHERE status = 'pending' AND next_retry_at <= ?",
                params![now],
                |row| row.get(0),
            )?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
    }

    /// Items that exhausted their retry budget.
    pub fn dead_count(&self) -> Result<u64> {
        self.count_by_status(QueueStatus::Dead)
    }

    /// Dead items awaiting manual intervention, oldest first.
    pub fn list_dead(&self) -> Result<Vec<QueueItem>> {
        self.store.with_conn(|conn, crypto| {
            items_where(conn, crypto, "status = 'dead'", params![], "created_at ASC")
        })
    }

    /// All pending items in delivery order, regardless of retry schedule.
    pub fn list_pending(&self) -> Result<Vec<QueueItem>> {
        self.store.with_conn(|conn, crypto| {
            items_where(
                conn,
                crypto,
                "status = 'pending'",
                params![],
                "priority ASC, created_at ASC, id ASC",
            )
        })
    }

    /// Re-arm a dead item for delivery, resetting its retry state.
    pub fn revive(&self, id: &QueueItemId) -> Result<()> {
        self.store.with_conn(|conn, _| {
            let rows = conn.execute(
                "UPDATE sync_queue
                 SET status = 'pending', retry_count = 0, next_retry_at = 0
                 WHERE id = ? AND status = 'dead'",
                params![id.as_str()],
            )?;
            if rows == 0 {
                return Err(Error::NotFound(format!("dead queue item {id}")));
            }
            Ok(())
        })
    }

    fn count_by_status(&self, status: QueueStatus) -> Result<u64> {
        self.store.with_conn(|conn, _| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sync_queue WHERE status = ?",
                params![status.as_str()],
                |row| row.get(0),
            )?;
            Ok(u64::try_from(count).unwrap_or(0))
        })
    }
}

/// Serialize a queue payload, encrypting bodies of sensitive entities.
fn encode_queue_payload(
    crypto: &dyn Crypto,
    entity: EntityKind,
    payload: Option<&serde_json::Value>,
) -> Result<Option<String>> {
    let Some(payload) = payload else {
        return Ok(None);
    };
    let text = serde_json::to_string(payload)?;
    if entity.is_sensitive() {
        Ok(Some(crypto.encrypt(&text)?))
    } else {
        Ok(Some(text))
    }
}

fn decode_queue_payload(
    crypto: &dyn Crypto,
    entity: EntityKind,
    stored: Option<String>,
) -> Result<Option<serde_json::Value>> {
    let Some(stored) = stored else {
        return Ok(None);
    };
    let text = if entity.is_sensitive() {
        crypto.decrypt(&stored)?
    } else {
        stored
    };
    Ok(Some(serde_json::from_str(&text)?))
}

pub(crate) fn insert_item(
    conn: &Connection,
    crypto: &dyn Crypto,
    item: &QueueItem,
) -> Result<()> {
    let payload = encode_queue_payload(crypto, item.entity, item.payload.as_ref())?;
    conn.execute(
        "INSERT INTO sync_queue (id, kind, entity, entity_id, payload, original_checksum,
                                 endpoint, method, created_at, retry_count, next_retry_at,
                                 last_error, priority, status)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            item.id.as_str(),
            item.kind.as_str(),
            item.entity.as_str(),
            item.entity_id,
            payload,
            item.original_checksum,
            item.endpoint,
            item.method.as_str(),
            item.created_at,
            item.retry_count,
            item.next_retry_at,
            item.last_error,
            item.priority,
            item.status.as_str(),
        ],
    )?;
    Ok(())
}

fn update_retry_state(conn: &Connection, item: &QueueItem) -> Result<()> {
    conn.execute(
        "UPDATE sync_queue
         SET retry_count = ?, next_retry_at = ?, last_error = ?, status = ?
         WHERE id = ?",
        params![
            item.retry_count,
            item.next_retry_at,
            item.last_error,
            item.status.as_str(),
            item.id.as_str(),
        ],
    )?;
    Ok(())
}

fn ready_items(conn: &Connection, crypto: &dyn Crypto, now: i64) -> Result<Vec<QueueItem>> {
    items_where(
        conn,
        crypto,
        "status = 'pending' AND next_retry_at <= ?",
        params![now],
        "priority ASC, created_at ASC, id ASC",
    )
}

pub(crate) fn get_item(
    conn: &Connection,
    crypto: &dyn Crypto,
    id: &QueueItemId,
) -> Result<Option<QueueItem>> {
    let items = items_where(conn, crypto, "id = ?", params![id.as_str()], "id ASC")?;
    Ok(items.into_iter().next())
}

type RawItemRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    String,
    i64,
    u32,
    i64,
    Option<String>,
    i64,
    String,
);

fn items_where(
    conn: &Connection,
    crypto: &dyn Crypto,
    clause: &str,
    args: &[&dyn rusqlite::types::ToSql],
    order: &str,
) -> Result<Vec<QueueItem>> {
    let sql = format!(
        "SELECT id, kind, entity, entity_id, payload, original_checksum, endpoint, method,
                created_at, retry_count, next_retry_at, last_error, priority, status
         FROM sync_queue WHERE {clause} ORDER BY {order}"
    );
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt
        .query_map(args, |row| {
            Ok::<RawItemRow, rusqlite::Error>((
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
                row.get(10)?,
                row.get(11)?,
                row.get(12)?,
                row.get(13)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut items = Vec::with_capacity(rows.len());
    for (
        id,
        kind,
        entity,
        entity_id,
        payload,
        original_checksum,
        endpoint,
        method,
        created_at,
        retry_count,
        next_retry_at,
        last_error,
        priority,
        status,
    ) in rows
    {
        let parsed = parse_item(
            crypto,
            &id,
            &kind,
            &entity,
            entity_id,
            payload,
            original_checksum,
            endpoint,
            &method,
            created_at,
            retry_count,
            next_retry_at,
            last_error,
            priority,
            &status,
        );
        match parsed {
            Ok(item) => items.push(item),
            Err(error) => {
                tracing::warn!("Skipping undecodable queue item {id}: {error}");
            }
        }
    }

    Ok(items)
}

#[allow(clippy::too_many_arguments)]
fn parse_item(
    crypto: &dyn Crypto,
    id: &str,
    kind: &str,
    entity: &str,
    entity_id: String,
    payload: Option<String>,
    original_checksum: Option<String>,
    endpoint: String,
    method: &str,
    created_at: i64,
    retry_count: u32,
    next_retry_at: i64,
    last_error: Option<String>,
    priority: i64,
    status: &str,
) -> Result<QueueItem> {
    let entity = EntityKind::from_str(entity).map_err(Error::InvalidInput)?;
    Ok(QueueItem {
        id: QueueItemId::from_str(id).map_err(|e| Error::InvalidInput(e.to_string()))?,
        kind: MutationKind::from_str(kind).map_err(Error::InvalidInput)?,
        entity,
        entity_id,
        payload: decode_queue_payload(crypto, entity, payload)?,
        original_checksum,
        endpoint,
        method: HttpMethod::from_str(method).map_err(Error::InvalidInput)?,
        created_at,
        retry_count,
        next_retry_at,
        last_error,
        priority,
        status: QueueStatus::from_str(status).map_err(Error::InvalidInput)?,
    })
}
