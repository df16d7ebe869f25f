//! Append-only audit history.

use boardsync_core::{DiagramId, HistoryEntry};
use boardsync_persistence::{DocumentStore, StoreResult};
use std::sync::Arc;
use tracing::warn;

/// History log over the document store.
///
/// Appends are best-effort from the pipeline's point of view: a history
/// write failure is logged and never fails the operation it records.
pub struct HistoryLog {
    docs: Arc<dyn DocumentStore>,
    limit: usize,
}

impl HistoryLog {
    pub fn new(docs: Arc<dyn DocumentStore>, limit: usize) -> Self {
        Self { docs, limit }
    }

    /// Appends one entry, swallowing (and logging) failures.
    pub async fn append(&self, entry: HistoryEntry) {
        if let Err(err) = self.docs.append_history(&entry).await {
            warn!(diagram = %entry.diagram_id, %err, "history append failed");
        }
    }

    /// Most-recent-first entries, capped at the configured read limit.
    pub async fn recent(&self, diagram: &DiagramId) -> StoreResult<Vec<HistoryEntry>> {
        self.docs.recent_history(diagram, self.limit).await
    }
}
