//! Configuration surface: one struct, a `Default` impl carrying the
//! documented defaults, and `Option<Arc<dyn Fn(..)>>` event callbacks.

use std::sync::Arc;
use std::time::Duration;

use crate::error::SyncTransportError;
use crate::sync::types::{MutationFailure, PendingMutation, SyncErrorEvent, SyncResponse, SyncStatus};

/// Tunables for `SyncEngine`. All fields have sensible defaults; construct
/// with `SyncConfig { api_base_url: "...".into(), ..Default::default() }`.
#[derive(Clone)]
pub struct SyncConfig {
    pub api_base_url: String,
    pub poll_interval: Duration,
    pub max_retries: u32,
    pub retry_backoff: u32,
    pub initial_retry_delay: Duration,
    pub client_id: Option<String>,
    pub push_batch_size: usize,
    pub pull_limit: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3001/api".to_string(),
            poll_interval: Duration::from_millis(5000),
            max_retries: 5,
            retry_backoff: 2,
            initial_retry_delay: Duration::from_millis(1000),
            client_id: None,
            push_batch_size: 10,
            pull_limit: 100,
        }
    }
}

/// Event callbacks the host may supply. Each is optional; the engine is
/// fully functional with none registered.
#[derive(Clone, Default)]
pub struct EngineEvents {
    pub on_status_change: Option<Arc<dyn Fn(&SyncStatus) + Send + Sync>>,
    pub on_sync_complete: Option<Arc<dyn Fn(&SyncResponse) + Send + Sync>>,
    pub on_sync_error: Option<Arc<dyn Fn(&SyncErrorEvent) + Send + Sync>>,
    pub on_mutations_pushed: Option<Arc<dyn Fn(usize) + Send + Sync>>,
    pub on_mutation_failed: Option<Arc<dyn Fn(&PendingMutation, &MutationFailure) + Send + Sync>>,
    pub on_online_change: Option<Arc<dyn Fn(bool) + Send + Sync>>,
}

impl std::fmt::Debug for EngineEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineEvents").finish_non_exhaustive()
    }
}

/// Shape returned from a failed transport call, kept distinct from
/// `SyncTransportError` so mutation-level rejections and transport-level
/// failures stay classified separately at call sites.
#[derive(Debug, Clone)]
pub struct TransportFailure(pub SyncTransportError);
