//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Advisory lock lifetime from acquisition or renewal.
pub const LOCK_TTL_SECS: u64 = 30;

/// A session is considered stale when idle longer than this.
pub const SESSION_STALE_SECS: u64 = 30;

/// Hash-level TTL of the cursors key.
pub const CURSOR_HASH_TTL_SECS: u64 = 10;

/// Cursors older than this are filtered from reads.
pub const CURSOR_FRESH_SECS: u64 = 15;

/// Cap on history entries returned per read.
pub const HISTORY_READ_LIMIT: usize = 100;

/// Upper bound on a single document store call. On timeout the hot snapshot
/// stays authoritative and persistence retries on the next debounce.
pub const DURABLE_IO_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Collaboration engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Debounce window between a non-critical operation and its durable flush
    pub persist_debounce: Duration,
    /// Maximum queued operations per diagram before rejection
    pub max_queue_depth: usize,
    /// Grace period before an empty room is evicted
    pub eviction_grace: Duration,
    /// History entries returned to a joining session
    pub history_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            persist_debounce: Duration::from_millis(1500),
            max_queue_depth: 1024,
            eviction_grace: Duration::from_secs(60),
            history_limit: HISTORY_READ_LIMIT,
        }
    }
}

impl EngineConfig {
    /// Configuration tuned for tests: tiny queues, no eviction delay.
    pub fn for_tests() -> Self {
        Self {
            persist_debounce: Duration::from_millis(1500),
            max_queue_depth: 64,
            eviction_grace: Duration::from_millis(50),
            history_limit: HISTORY_READ_LIMIT,
        }
    }
}
