//! Wire types, the pending-mutation/metadata records, and the
//! `SyncTransport` trait — the remote authority contract realized as Rust
//! types and an async trait.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entity::EntityKind;
use crate::error::SyncTransportError;

// ============================================================================
// Pending mutation / sync metadata
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationOp {
    Create,
    Update,
    Delete,
}

/// A user-initiated change queued for eventual transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingMutation {
    pub id: String,
    pub operation: MutationOp,
    pub entity_type: EntityKind,
    pub entity_id: String,
    /// A partial entity for create/update; absent for delete.
    pub payload: Option<Value>,
    pub created_at: String,
    pub retry_count: u32,
    pub last_error: Option<String>,
}

/// The singleton sync metadata record.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SyncMetadata {
    pub last_sync_id: i64,
    pub last_synced_at: Option<String>,
    pub client_id: Option<String>,
}

/// The constant key the metadata singleton lives under.
pub const SYNC_METADATA_KEY: &str = "sync_metadata";

/// A partial update to `SyncMetadata` — `write_meta` is upsert.
#[derive(Debug, Clone, Default)]
pub struct MetaPatch {
    pub last_sync_id: Option<i64>,
    pub last_synced_at: Option<String>,
    pub client_id: Option<String>,
}

// ============================================================================
// Wire protocol — field names are bit-exact via serde rename
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub last_sync_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct KindChanges<T> {
    pub created: Vec<T>,
    pub updated: Vec<T>,
    pub deleted: Vec<String>,
}

impl<T> KindChanges<T> {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChangeSet {
    pub prompts: KindChanges<crate::entity::Prompt>,
    #[serde(rename = "promptVersions")]
    pub prompt_versions: KindChanges<crate::entity::PromptVersion>,
    pub groups: KindChanges<crate::entity::Group>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty() && self.prompt_versions.is_empty() && self.groups.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub sync_id: i64,
    pub timestamp: String,
    pub has_more: bool,
    pub changes: ChangeSet,
}

/// The wire form of a mutation. `entity_type` is a raw string rather than
/// `EntityKind` so that an unrecognized kind fails deserialization of that
/// one field's owner gracefully at the application layer (a per-mutation
/// failure) instead of rejecting the whole batch at the JSON-extraction
/// layer the way a strict enum would.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMutation {
    pub id: String,
    pub operation: MutationOp,
    pub entity_type: String,
    pub entity_id: String,
    pub payload: Option<Value>,
    pub timestamp: String,
    pub retry_count: u32,
}

impl From<&PendingMutation> for WireMutation {
    fn from(m: &PendingMutation) -> Self {
        Self {
            id: m.id.clone(),
            operation: m.operation,
            entity_type: m.entity_type.as_str().to_string(),
            entity_id: m.entity_id.clone(),
            payload: m.payload.clone(),
            timestamp: m.created_at.clone(),
            retry_count: m.retry_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationsRequest {
    pub client_id: String,
    pub mutations: Vec<WireMutation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationResult {
    pub mutation_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationsResponse {
    pub success: bool,
    pub sync_id: i64,
    pub results: Vec<MutationResult>,
    /// Reserved for future conflict reporting; ignored by this engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<Vec<Value>>,
}

// ============================================================================
// SyncTransport — the remote authority contract as a trait
// ============================================================================

/// User- or production-provided network layer speaking the wire protocol.
/// `HttpTransport` is the shipped implementation; tests substitute an
/// in-process mock.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn pull(&self, req: SyncRequest) -> std::result::Result<SyncResponse, SyncTransportError>;

    async fn push(
        &self,
        req: MutationsRequest,
    ) -> std::result::Result<MutationsResponse, SyncTransportError>;
}

pub type DynTransport = Arc<dyn SyncTransport>;

// ============================================================================
// Status / event types
// ============================================================================

/// `SyncEngine` status state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncStatus {
    Idle,
    Syncing,
    Pushing,
    Error(String),
    Offline,
}

impl Default for SyncStatus {
    fn default() -> Self {
        SyncStatus::Idle
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Pull,
    Push,
}

#[derive(Debug, Clone)]
pub struct SyncErrorEvent {
    pub phase: SyncPhase,
    pub error: String,
}

/// Reported to `on_mutation_failed` when a mutation's retry budget is
/// exhausted.
#[derive(Debug, Clone)]
pub struct MutationFailure {
    pub error: String,
}
