//! Error types for the boardsync core crate.

use crate::operation::OperationKind;
use thiserror::Error;

/// Core model errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Operation kind requires a target id but none was supplied
    #[error("operation {id} ({kind}) is missing a target id")]
    MissingTarget { id: String, kind: OperationKind },

    /// Operation payload does not fit the declared kind
    #[error("malformed payload for {kind}: {reason}")]
    MalformedPayload { kind: OperationKind, reason: String },

    /// Snapshot field could not be encoded or decoded
    #[error("snapshot serialization failed for field {field}: {reason}")]
    SnapshotSerialization { field: String, reason: String },
}

/// Result type for core operations
pub type CoreResult<T> = std::result::Result<T, CoreError>;
