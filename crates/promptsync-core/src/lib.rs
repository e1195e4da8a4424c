//! Local-first sync engine for a prompt catalog: a durable store, a
//! projected in-memory view, and a cursor-driven sync engine that keeps
//! the two coherent with a remote authority over HTTP.
//!
//! ```text
//! presentation layer
//!        |  read snapshot()/subscribe()      | call create_*/update_*/delete_*
//!        v                                   v
//!                     ProjectedView
//!        |  persist_put/enqueue              ^  apply_server_changes/status
//!        v                                   |
//!                     DurableStore  <---->  SyncEngine  <---->  SyncTransport
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod store;
pub mod sync;
pub mod view;

pub use config::{EngineEvents, SyncConfig};
pub use entity::{EntityKind, Envelope, Group, GroupFields, Prompt, PromptFields, PromptVersion, PromptVersionFields};
pub use error::{PromptSyncError, Result, StoreError, StoreResult, SyncErrorKind, SyncTransportError};
pub use store::{memory::MemoryStore, sqlite::SqliteStore, DurableStore};
pub use sync::{HttpTransport, SyncEngine, SyncStatus, SyncTransport as Transport};
pub use view::{ProjectedView, ViewSnapshot};

use std::sync::Arc;

/// Wires a store, transport and config into a running replica: builds the
/// `ProjectedView`, hydrates it from `store`, constructs the `SyncEngine`,
/// and calls `init()`. The caller still owns `start()`/`stop()` as a
/// distinct, explicit step from construction.
pub fn bootstrap(
    store: Arc<dyn DurableStore>,
    transport: Arc<dyn sync::SyncTransport>,
    config: SyncConfig,
    events: EngineEvents,
) -> (Arc<ProjectedView>, Arc<SyncEngine>) {
    let view = Arc::new(ProjectedView::new(Arc::clone(&store)));
    view.hydrate();

    let engine = Arc::new(SyncEngine::new(Arc::clone(&view), store, transport, config, events));
    engine.init();

    (view, engine)
}
