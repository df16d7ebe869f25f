//! Error types for the boardsync network layer.

use thiserror::Error;

/// Network layer errors
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Listener could not be bound
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    /// Server task failed
    #[error("server error: {0}")]
    Server(#[from] hyper::Error),

    /// Configuration value could not be parsed
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig { field: String, reason: String },
}

/// Result type for network operations
pub type NetworkResult<T> = std::result::Result<T, NetworkError>;
