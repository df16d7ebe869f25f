//! Error types for the boardsync persistence layer.

use thiserror::Error;

/// Store operation errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Cache store unreachable or misbehaving
    #[error("cache store unavailable: {reason}")]
    CacheUnavailable { reason: String },

    /// Document store I/O failure
    #[error("document store I/O failed for {id}: {reason}")]
    DocumentIo { id: String, reason: String },

    /// Key cannot be used with this backend
    #[error("invalid store key {key}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// Value could not be encoded or decoded
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;
