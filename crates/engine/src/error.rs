//! Error types for the boardsync collaboration engine.

use boardsync_core::{CoreError, DiagramId};
use boardsync_persistence::StoreError;
use thiserror::Error;

/// Engine operation errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Underlying cache or document store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Core model violation
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Per-diagram queue is at capacity
    #[error("operation queue full for diagram {diagram} (depth {depth})")]
    QueueFull { diagram: DiagramId, depth: usize },

    /// Room worker is gone and could not be replaced
    #[error("room closed for diagram {diagram}")]
    RoomClosed { diagram: DiagramId },
}

/// Result type for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;
