//! The sync subsystem: wire types and the `SyncTransport` contract, the
//! HTTP transport implementation, and the `SyncEngine` that drives
//! pull/push on a schedule.

pub mod engine;
pub mod scheduler;
pub mod transport;
pub mod types;

pub use engine::SyncEngine;
pub use transport::HttpTransport;
pub use types::{
    ChangeSet, DynTransport, KindChanges, MutationOp, MutationResult, MutationsRequest,
    MutationsResponse, PendingMutation, SyncErrorEvent, SyncMetadata, SyncPhase, SyncRequest,
    SyncResponse, SyncStatus, SyncTransport, WireMutation,
};
