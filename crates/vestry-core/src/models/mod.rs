//! Data model shared by the store, queue, resolver, and orchestrator

mod conflict;
mod meta;
mod queue_item;
mod record;

pub use conflict::{ConflictId, ConflictRecord, Resolution};
pub use meta::{last_sync_key, MetaEntry};
pub use queue_item::{HttpMethod, MutationDraft, MutationKind, QueueItem, QueueItemId, QueueStatus};
pub use record::{CachedRecord, EntityKind};
