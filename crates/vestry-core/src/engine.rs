//! Engine facade
//!
//! [`OfflineEngine`] composes the store, mutation queue, conflict resolver,
//! storage manager, and sync orchestrator behind the surface the application
//! talks to. Local writes are staged here: the cached record update and the
//! outbound queue insert happen in one store transaction, so a crash can
//! never leave a modified record without its pending mutation or vice versa.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::conflict::ConflictResolver;
use crate::crypto::{checksum_of, Crypto};
use crate::error::{Error, Result};
use crate::models::{
    last_sync_key, CachedRecord, ConflictId, ConflictRecord, EntityKind, HttpMethod,
    MutationDraft, MutationKind, QueueItem, QueueItemId, Resolution,
};
use crate::queue::{insert_item, MutationQueue};
use crate::storage::{EvictionReport, StorageManager, StorageUsage};
use crate::store::Store;
use crate::sync::{SyncOrchestrator, SyncProgress, SyncReport};
use crate::transport::{HttpTransport, Transport};
use crate::util::now_ms;

/// Aggregate counters for observability surfaces.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStats {
    /// Cached record count per entity
    pub records: Vec<(EntityKind, u64)>,
    /// Queued mutations awaiting delivery
    pub pending_mutations: u64,
    /// Queued mutations deliverable right now
    pub ready_mutations: u64,
    /// Mutations that exhausted their retry budget
    pub dead_mutations: u64,
    /// Conflicts awaiting adjudication
    pub unresolved_conflicts: u64,
    /// Last successful sync timestamp (unix ms) per entity
    pub last_sync: Vec<(EntityKind, Option<i64>)>,
    pub usage: StorageUsage,
}

/// Offline data-resilience engine: durable local storage, ordered mutation
/// delivery, conflict adjudication, and storage housekeeping.
pub struct OfflineEngine {
    config: EngineConfig,
    store: Arc<Store>,
    queue: Arc<MutationQueue>,
    resolver: Arc<ConflictResolver>,
    storage: StorageManager,
    orchestrator: Arc<SyncOrchestrator>,
    crypto: Arc<dyn Crypto>,
    interval: Mutex<Option<JoinHandle<()>>>,
}

impl OfflineEngine {
    /// Open an engine over an on-disk store, delivering through the bundled
    /// HTTP transport.
    pub fn open(
        path: impl AsRef<Path>,
        config: EngineConfig,
        crypto: Arc<dyn Crypto>,
    ) -> Result<Self> {
        let store = Arc::new(Store::open(path, Arc::clone(&crypto))?);
        let transport = Arc::new(HttpTransport::new(
            config.api_base_url.clone(),
            config.auth_token.clone(),
            config.request_timeout,
        )?);
        Ok(Self::assemble(store, transport, config, crypto))
    }

    /// Open an engine over an in-memory store (useful for testing).
    pub fn open_in_memory(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        crypto: Arc<dyn Crypto>,
    ) -> Result<Self> {
        let store = Arc::new(Store::open_in_memory(Arc::clone(&crypto))?);
        Ok(Self::assemble(store, transport, config, crypto))
    }

    /// Compose an engine from an already-open store and transport.
    pub fn assemble(
        store: Arc<Store>,
        transport: Arc<dyn Transport>,
        config: EngineConfig,
        crypto: Arc<dyn Crypto>,
    ) -> Self {
        let queue = Arc::new(MutationQueue::new(
            Arc::clone(&store),
            config.backoff.clone(),
        ));
        let resolver = Arc::new(ConflictResolver::new(Arc::clone(&store)));
        let storage = StorageManager::new(Arc::clone(&store), config.storage_limit_bytes);
        let orchestrator = Arc::new(SyncOrchestrator::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::clone(&resolver),
            transport,
            Arc::clone(&crypto),
        ));

        Self {
            config,
            store,
            queue,
            resolver,
            storage,
            orchestrator,
            crypto,
            interval: Mutex::new(None),
        }
    }

    /// Spawn the periodic sync trigger when an interval is configured.
    ///
    /// Must be called from within a tokio runtime. Idempotent.
    pub fn start(&self) {
        let Some(period) = self.config.sync_interval else {
            return;
        };
        let mut guard = self.interval.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            *guard = Some(self.orchestrator.spawn_interval(period));
        }
    }

    /// Stop the periodic trigger. The store itself closes on drop.
    pub fn close(&self) {
        if let Some(handle) = self
            .interval
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }

    // ---- local writes ----------------------------------------------------

    /// Stage a local create: cache the record as modified and enqueue a POST,
    /// atomically.
    pub fn stage_create(
        &self,
        entity: EntityKind,
        id: impl Into<String>,
        payload: Value,
    ) -> Result<CachedRecord> {
        let id = id.into();
        let now = now_ms();
        let record = CachedRecord {
            entity,
            id: id.clone(),
            checksum: checksum_of(self.crypto.as_ref(), &payload),
            payload: payload.clone(),
            synced_at: None,
            modified_at: now,
            is_modified: true,
            version: 1,
        };
        let item = QueueItem::from_draft(
            MutationDraft {
                kind: MutationKind::Create,
                entity,
                entity_id: id.clone(),
                payload: Some(payload),
                original_checksum: None,
                endpoint: format!("/{}", entity.api_path()),
                method: HttpMethod::Post,
            },
            now,
        );

        self.store.tx_raw(|conn, crypto| {
            if crate::store::get_record(conn, crypto, entity, &id)?.is_some() {
                return Err(Error::InvalidInput(format!(
                    "record {entity}/{id} already exists"
                )));
            }
            crate::store::put_record(conn, crypto, &record)?;
            insert_item(conn, crypto, &item)
        })?;

        tracing::debug!("Staged create of {entity}/{id}");
        Ok(record)
    }

    /// Stage a local update: bump the cached record's version and enqueue a
    /// PUT, atomically. The record must already be cached.
    pub fn stage_update(
        &self,
        entity: EntityKind,
        id: &str,
        payload: Value,
    ) -> Result<CachedRecord> {
        let now = now_ms();
        let record = self.store.tx_raw(|conn, crypto| {
            let mut record = crate::store::get_record(conn, crypto, entity, id)?
                .ok_or_else(|| Error::NotFound(format!("record {entity}/{id}")))?;

            let original_checksum = record.checksum.clone();
            record.checksum = checksum_of(crypto, &payload);
            record.payload = payload.clone();
            record.modified_at = now;
            record.is_modified = true;
            record.version += 1;
            crate::store::put_record(conn, crypto, &record)?;

            let item = QueueItem::from_draft(
                MutationDraft {
                    kind: MutationKind::Update,
                    entity,
                    entity_id: id.to_string(),
                    payload: Some(payload),
                    original_checksum: Some(original_checksum),
                    endpoint: format!("/{}/{id}", entity.api_path()),
                    method: HttpMethod::Put,
                },
                now,
            );
            insert_item(conn, crypto, &item)?;
            Ok(record)
        })?;

        tracing::debug!("Staged update of {entity}/{id} to version {}", record.version);
        Ok(record)
    }

    /// Stage a local delete: enqueue a DELETE and pin the cached record as
    /// modified until the server acknowledges, atomically. The cached record
    /// itself is removed by the successful delete-sync.
    pub fn stage_delete(&self, entity: EntityKind, id: &str) -> Result<()> {
        let now = now_ms();
        self.store.tx_raw(|conn, crypto| {
            let original_checksum = match crate::store::get_record(conn, crypto, entity, id)? {
                Some(mut record) => {
                    let checksum = record.checksum.clone();
                    record.modified_at = now;
                    record.is_modified = true;
                    record.version += 1;
                    crate::store::put_record(conn, crypto, &record)?;
                    Some(checksum)
                }
                None => None,
            };

            let item = QueueItem::from_draft(
                MutationDraft {
                    kind: MutationKind::Delete,
                    entity,
                    entity_id: id.to_string(),
                    payload: None,
                    original_checksum,
                    endpoint: format!("/{}/{id}", entity.api_path()),
                    method: HttpMethod::Delete,
                },
                now,
            );
            insert_item(conn, crypto, &item)
        })?;

        tracing::debug!("Staged delete of {entity}/{id}");
        Ok(())
    }

    // ---- server reads ----------------------------------------------------

    /// Cache a page of freshly fetched server records in one transaction.
    ///
    /// Rows with pending local modifications are left untouched so a fetch
    /// can never clobber unsynced work. Returns the number cached.
    pub fn cache_server_records(
        &self,
        entity: EntityKind,
        records: &[(String, Value)],
    ) -> Result<u64> {
        let now = now_ms();
        let cached = self.store.tx_raw(|conn, crypto| {
            let mut cached = 0u64;
            for (id, payload) in records {
                let existing = crate::store::get_record(conn, crypto, entity, id)?;
                if existing.as_ref().is_some_and(|record| record.is_modified) {
                    tracing::debug!("Skipping fetched {entity}/{id}: locally modified");
                    continue;
                }

                let mut record = CachedRecord::from_server(
                    entity,
                    id.clone(),
                    payload.clone(),
                    checksum_of(crypto, payload),
                    now,
                );
                if let Some(existing) = existing {
                    record.version = existing.version;
                }
                crate::store::put_record(conn, crypto, &record)?;
                cached += 1;
            }
            Ok(cached)
        })?;

        self.store
            .set_meta(&last_sync_key(entity), &now.to_string())?;
        Ok(cached)
    }

    /// Fetch one cached record.
    pub fn get(&self, entity: EntityKind, id: &str) -> Result<Option<CachedRecord>> {
        self.store.get(entity, id)
    }

    /// All cached records of an entity.
    pub fn records(&self, entity: EntityKind) -> Result<Vec<CachedRecord>> {
        self.store.query(entity, |_| true)
    }

    // ---- sync ------------------------------------------------------------

    /// Trigger one sync cycle (single-flight; a no-op while offline or when
    /// a cycle is already running).
    pub async fn sync(&self) -> Result<SyncReport> {
        self.orchestrator.sync().await
    }

    /// Request cooperative pause of the running cycle.
    pub fn pause(&self) {
        self.orchestrator.pause();
    }

    /// Clear the pause flag.
    pub fn resume(&self) {
        self.orchestrator.resume();
    }

    /// Record a connectivity change; the offline-to-online transition
    /// triggers an immediate sync cycle.
    pub async fn set_online(&self, online: bool) -> Result<Option<SyncReport>> {
        if self.orchestrator.set_online(online) {
            return Ok(Some(self.sync().await?));
        }
        Ok(None)
    }

    pub fn is_online(&self) -> bool {
        self.orchestrator.is_online()
    }

    /// Latest sync progress snapshot.
    pub fn progress(&self) -> SyncProgress {
        self.orchestrator.progress()
    }

    /// Subscribe to per-item progress events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncProgress> {
        self.orchestrator.subscribe()
    }

    // ---- queue observability ---------------------------------------------

    pub fn pending_count(&self) -> Result<u64> {
        self.queue.total_count()
    }

    pub fn ready_count(&self) -> Result<u64> {
        self.queue.ready_count(now_ms())
    }

    pub fn dead_count(&self) -> Result<u64> {
        self.queue.dead_count()
    }

    /// Queued mutations in delivery order.
    pub fn pending_items(&self) -> Result<Vec<QueueItem>> {
        self.queue.list_pending()
    }

    /// Mutations that exhausted their retry budget, oldest first.
    pub fn dead_items(&self) -> Result<Vec<QueueItem>> {
        self.queue.list_dead()
    }

    /// Re-arm a dead mutation for delivery.
    pub fn revive(&self, id: &QueueItemId) -> Result<()> {
        self.queue.revive(id)
    }

    // ---- conflicts -------------------------------------------------------

    /// Conflicts awaiting adjudication, oldest first.
    pub fn conflicts(&self) -> Result<Vec<ConflictRecord>> {
        self.resolver.list_unresolved()
    }

    /// Apply a caller-chosen resolution to a conflict, exactly once.
    pub fn resolve_conflict(
        &self,
        id: &ConflictId,
        resolution: Resolution,
        merged_payload: Option<Value>,
    ) -> Result<CachedRecord> {
        self.resolver.resolve(id, resolution, merged_payload)
    }

    // ---- housekeeping ----------------------------------------------------

    /// Evict unmodified cached records older than the configured TTL.
    pub fn cleanup(&self) -> Result<EvictionReport> {
        self.storage.evict_expired(self.config.cache_ttl, now_ms())
    }

    /// Current storage usage against the configured quota.
    pub fn usage(&self) -> StorageUsage {
        self.storage.usage()
    }

    /// Wipe every table. Full logout/reset only.
    pub fn clear_all(&self) -> Result<()> {
        self.storage.clear_all()
    }

    /// Aggregate counters for status surfaces.
    pub fn stats(&self) -> Result<EngineStats> {
        let mut records = Vec::with_capacity(EntityKind::ALL.len());
        let mut last_sync = Vec::with_capacity(EntityKind::ALL.len());
        for entity in EntityKind::ALL {
            records.push((entity, self.store.count(entity)?));
            let synced_at = self
                .store
                .meta(&last_sync_key(entity))?
                .and_then(|entry| entry.value.parse::<i64>().ok());
            last_sync.push((entity, synced_at));
        }

        Ok(EngineStats {
            records,
            pending_mutations: self.queue.total_count()?,
            ready_mutations: self.queue.ready_count(now_ms())?,
            dead_mutations: self.queue.dead_count()?,
            unresolved_conflicts: self.resolver.unresolved_count()?,
            last_sync,
            usage: self.storage.usage(),
        })
    }
}

impl Drop for OfflineEngine {
    fn drop(&mut self) {
        self.close();
    }
}
