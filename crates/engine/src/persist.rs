//! Debounced durable persistence with critical-operation flush.

use boardsync_core::{DiagramId, Snapshot};
use boardsync_persistence::DocumentStore;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

struct PendingSave {
    generation: u64,
    snapshot: Snapshot,
}

/// Per-diagram debounced writer to the document store.
///
/// Each `debounce` replaces the pending snapshot and arms a fresh timer by
/// bumping a generation counter; a timer that fires against a superseded
/// generation does nothing. `flush` cancels whatever is pending and writes
/// immediately. Transient diagram ids are never written.
pub struct PersistenceWriter {
    docs: Arc<dyn DocumentStore>,
    window: Duration,
    pending: DashMap<DiagramId, PendingSave>,
}

impl PersistenceWriter {
    pub fn new(docs: Arc<dyn DocumentStore>, window: Duration) -> Self {
        Self {
            docs,
            window,
            pending: DashMap::new(),
        }
    }

    /// Schedules `snapshot` for a durable write after the debounce window,
    /// replacing any previously pending snapshot for the diagram.
    pub fn debounce(self: &Arc<Self>, diagram: DiagramId, snapshot: Snapshot) {
        if !diagram.is_durable() {
            return;
        }
        let generation = {
            let mut entry = self.pending.entry(diagram.clone()).or_insert(PendingSave {
                generation: 0,
                snapshot: snapshot.clone(),
            });
            entry.generation += 1;
            entry.snapshot = snapshot;
            entry.generation
        };

        let writer = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(writer.window).await;
            writer.fire(diagram, generation).await;
        });
    }

    /// Writes immediately: `snapshot` when given, else whatever is pending.
    /// Any pending debounce for the diagram is cancelled either way.
    pub async fn flush(&self, diagram: &DiagramId, snapshot: Option<Snapshot>) {
        let pending = self.pending.remove(diagram).map(|(_, p)| p.snapshot);
        if !diagram.is_durable() {
            return;
        }
        if let Some(snapshot) = snapshot.or(pending) {
            self.write(diagram, &snapshot).await;
        }
    }

    /// Drops any pending write without flushing (diagram deletion).
    pub fn cancel(&self, diagram: &DiagramId) {
        self.pending.remove(diagram);
    }

    async fn fire(&self, diagram: DiagramId, generation: u64) {
        let Some((_, pending)) = self
            .pending
            .remove_if(&diagram, |_, p| p.generation == generation)
        else {
            // Superseded by a later debounce or an explicit flush.
            return;
        };
        self.write(&diagram, &pending.snapshot).await;
    }

    async fn write(&self, diagram: &DiagramId, snapshot: &Snapshot) {
        let save = self.docs.save_diagram(diagram, snapshot);
        match tokio::time::timeout(crate::config::DURABLE_IO_TIMEOUT, save).await {
            Ok(Ok(())) => {
                debug!(diagram = %diagram, version = snapshot.version, "snapshot flushed");
            }
            Ok(Err(err)) => {
                // The hot snapshot stays authoritative; the next debounce
                // cycle retries.
                warn!(diagram = %diagram, %err, "durable flush failed");
            }
            Err(_) => {
                warn!(diagram = %diagram, "durable flush timed out");
            }
        }
    }
}
