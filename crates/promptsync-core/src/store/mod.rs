//! The durable store: crash-safe persistence for entities, the
//! pending-mutation queue, and sync metadata.
//!
//! A narrow trait implemented by a real backend (`SqliteStore`) and an
//! in-memory one (`MemoryStore`) used in tests and as a fast local cache.
//! Entities are stored as `serde_json::Value` blobs — this crate's three
//! concrete entity kinds are converted to/from `Value` at the boundary by
//! the caller (`ProjectedView`), which is the one place that knows their
//! Rust types.

pub mod memory;
pub mod sqlite;

use serde_json::Value;

use crate::entity::EntityKind;
use crate::error::StoreResult;
use crate::sync::types::{KindChanges, MetaPatch, PendingMutation, SyncMetadata};

/// A patch to a queued mutation's retry bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct MutationPatch {
    pub retry_count: Option<u32>,
    pub last_error: Option<Option<String>>,
}

/// The net changes to apply across all three kinds plus the metadata write,
/// as a single atomic batch.
#[derive(Debug, Clone, Default)]
pub struct DeltaBatch {
    pub prompts: KindChanges<Value>,
    pub prompt_versions: KindChanges<Value>,
    pub groups: KindChanges<Value>,
    pub meta: MetaPatch,
}

/// Crash-safe persistence for entities, the pending-mutation queue, and
/// sync metadata.
///
/// # Threading
/// Methods are synchronous; `SqliteStore` uses blocking `rusqlite` calls.
/// Callers on an async runtime should be aware these calls block the
/// current thread for the duration of the (local, typically sub-millisecond)
/// disk I/O.
pub trait DurableStore: Send + Sync {
    fn put(&self, kind: EntityKind, id: &str, entity: Value) -> StoreResult<()>;

    fn bulk_put(&self, kind: EntityKind, entities: Vec<Value>) -> StoreResult<()>;

    /// Shallow-merges `patch`'s object keys into the stored record's JSON
    /// object. No-op (returns `Ok(())`) if the record doesn't exist — the
    /// caller (`ProjectedView`) is responsible for the "no-op if missing"
    /// semantics at the mutation-operation level; this method additionally
    /// tolerates it for direct callers.
    fn update(&self, kind: EntityKind, id: &str, patch: Value) -> StoreResult<()>;

    fn get(&self, kind: EntityKind, id: &str) -> StoreResult<Option<Value>>;

    /// Records where the soft-deleted flag is not set.
    fn active_of(&self, kind: EntityKind) -> StoreResult<Vec<Value>>;

    /// Non-deleted `PromptVersion`s whose `promptId` matches.
    fn versions_of(&self, prompt_id: &str) -> StoreResult<Vec<Value>>;

    fn enqueue_mutation(&self, m: PendingMutation) -> StoreResult<()>;

    fn dequeue_mutation(&self, id: &str) -> StoreResult<()>;

    fn update_mutation(&self, id: &str, patch: MutationPatch) -> StoreResult<()>;

    /// Pending mutations sorted ascending by `created_at` (FIFO drain order).
    fn drain_ordered(&self) -> StoreResult<Vec<PendingMutation>>;

    fn read_meta(&self) -> StoreResult<SyncMetadata>;

    /// Upsert of the singleton metadata record.
    fn write_meta(&self, patch: MetaPatch) -> StoreResult<()>;

    /// All-or-nothing across the entity kinds it touches plus the metadata
    /// write.
    fn apply_deltas(&self, batch: DeltaBatch) -> StoreResult<()>;

    /// Removes every record; used for logout/reset.
    fn clear_all(&self) -> StoreResult<()>;
}
