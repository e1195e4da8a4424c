//! Error taxonomy: one `thiserror` enum per concern, composed into a single
//! top-level error for call sites that need it.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PromptSyncError>;

/// Errors from the durable store, including local persistence failures
/// surfaced during hydration.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record not found: {kind}/{id}")]
    NotFound { kind: String, id: String },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Classification of sync transport errors, splitting retriable failures
/// from ones retrying won't fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncErrorKind {
    /// Retriable (network, temporary failures).
    Transient,
    /// Not retriable (validation, unknown entity kind, etc.)
    Permanent,
    /// Authentication failed. Not branched on separately by this engine;
    /// carried for forward compatibility (see DESIGN.md).
    Auth,
    /// Rate limit or quota exceeded. Same treatment as `Auth`.
    Capacity,
}

/// A transport-level failure (network unreachable, non-2xx, unparseable
/// body). Treated at batch granularity: one transport error fails the
/// whole pull or push, not individual entities within it.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SyncTransportError {
    pub message: String,
    pub kind: SyncErrorKind,
}

impl SyncTransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: SyncErrorKind::Transient,
        }
    }

    pub fn with_kind(message: impl Into<String>, kind: SyncErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

/// Errors in constructing a `SyncConfig`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid api_base_url: {0}")]
    InvalidUrl(String),
}

/// Aggregate error type for call sites (engine lifecycle methods) that need
/// a single `Result<T, E>`.
#[derive(Debug, Error)]
pub enum PromptSyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] SyncTransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
