//! vestry-core - Offline data-resilience engine for Vestry
//!
//! This crate contains the client-resident persistent store, mutation queue,
//! conflict resolver, storage manager, and sync orchestrator that keep the
//! membership portal working, and accepting writes, without connectivity.

pub mod config;
pub mod conflict;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod models;
pub mod queue;
pub mod storage;
pub mod store;
pub mod sync;
pub mod transport;

mod util;

pub use config::EngineConfig;
pub use engine::{EngineStats, OfflineEngine};
pub use error::{Error, Result};
pub use models::{
    CachedRecord, ConflictId, ConflictRecord, EntityKind, MutationKind, QueueItem, QueueItemId,
    Resolution,
};
