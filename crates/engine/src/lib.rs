//! # Boardsync Engine
//!
//! The collaboration runtime of boardsync: one authoritative in-memory
//! snapshot per diagram, mutated by a per-diagram serial operation pipeline
//! and fanned out to every other connected session.
//!
//! ## Architecture
//!
//! - **[`StateStore`]**: hot snapshot cache over the cache store contract
//! - **[`PresenceStore`]**: online sessions and cursors, keyed by client id
//! - **[`LockManager`]**: advisory per-element locks with a 30 s lease
//! - **[`apply`]**: the pure `(snapshot, operation)` to snapshot transition
//! - **[`Rooms`]**: one worker task per active diagram running the full
//!   merge, apply, broadcast, persist and audit loop
//! - **[`PersistenceWriter`]**: debounced durable flushes, immediate for
//!   critical operations
//! - **[`HistoryLog`]**: append-only audit trail, capped on read
//!
//! [`CollabEngine`] wires these together from a cache store, a document
//! store and a fan-out sink, and is the only type the gateway needs.

pub mod apply;
pub mod config;
pub mod error;
pub mod history;
pub mod locks;
pub mod persist;
pub mod pipeline;
pub mod presence;
pub mod state;

pub use apply::apply;
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use history::HistoryLog;
pub use locks::{LockManager, LockOutcome, LockRecord};
pub use persist::PersistenceWriter;
pub use pipeline::{
    AppliedOperation, NullFanout, OperationEnvelope, OperationFanout, Rooms,
};
pub use presence::{ClientId, CursorRecord, PresenceStore, SessionRecord, UserIdentity};
pub use state::StateStore;

use boardsync_core::{DiagramId, LamportClock, Snapshot};
use boardsync_persistence::{CacheStore, DocumentStore};
use pipeline::RoomServices;
use std::sync::Arc;
use tracing::{info, warn};

/// The assembled collaboration engine.
///
/// Everything the session gateway touches hangs off this type; the module
/// stores behind it are explicit constructor dependencies, never globals.
pub struct CollabEngine {
    clock: Arc<LamportClock>,
    state: Arc<StateStore>,
    presence: Arc<PresenceStore>,
    locks: Arc<LockManager>,
    persist: Arc<PersistenceWriter>,
    history: Arc<HistoryLog>,
    rooms: Rooms,
    docs: Arc<dyn DocumentStore>,
    config: EngineConfig,
}

impl CollabEngine {
    /// Builds an engine over the given stores and fan-out sink.
    pub fn new(
        cache: Arc<dyn CacheStore>,
        docs: Arc<dyn DocumentStore>,
        fanout: Arc<dyn OperationFanout>,
        config: EngineConfig,
    ) -> Arc<Self> {
        let clock = Arc::new(LamportClock::new());
        let state = Arc::new(StateStore::new(cache.clone()));
        let presence = Arc::new(PresenceStore::new(cache.clone()));
        let locks = Arc::new(LockManager::new(cache.clone()));
        let persist = Arc::new(PersistenceWriter::new(docs.clone(), config.persist_debounce));
        let history = Arc::new(HistoryLog::new(docs.clone(), config.history_limit));

        let services = Arc::new(RoomServices {
            clock: clock.clone(),
            state: state.clone(),
            persist: persist.clone(),
            history: history.clone(),
            docs: docs.clone(),
            fanout,
        });
        let rooms = Rooms::new(services, config.clone());

        Arc::new(Self {
            clock,
            state,
            presence,
            locks,
            persist,
            history,
            rooms,
            docs,
            config,
        })
    }

    pub fn presence(&self) -> &PresenceStore {
        &self.presence
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn clock(&self) -> &LamportClock {
        &self.clock
    }

    /// Number of diagrams with a live room worker.
    pub fn open_rooms(&self) -> usize {
        self.rooms.len()
    }

    /// Queues an operation for the diagram's serial pipeline.
    pub fn submit_operation(
        &self,
        diagram: &DiagramId,
        envelope: OperationEnvelope,
    ) -> EngineResult<()> {
        self.rooms.submit(diagram, envelope)
    }

    /// Resolves once every operation queued for `diagram` before this call
    /// has been applied. Disconnect cleanup runs behind this barrier so a
    /// session's own trailing operations are never lost.
    pub async fn sync(&self, diagram: &DiagramId) {
        self.rooms.barrier(diagram).await;
    }

    /// Snapshot for a joining session: hot state when present, else the
    /// durable copy (durable ids only), else empty. A durable read failure
    /// yields an empty snapshot plus a warning for the `state_sync` message.
    pub async fn snapshot_for_join(&self, diagram: &DiagramId) -> (Snapshot, Option<String>) {
        match self.state.get(diagram).await {
            Ok(Some(snapshot)) => return (snapshot, None),
            Ok(None) => {}
            Err(err) => {
                warn!(diagram = %diagram, %err, "hot state read failed at join");
            }
        }

        if !diagram.is_durable() {
            return (Snapshot::empty(), None);
        }

        match self.docs.load_diagram(diagram).await {
            Ok(Some(snapshot)) => {
                if let Err(err) = self.state.init_from_durable(diagram, &snapshot).await {
                    warn!(diagram = %diagram, %err, "failed to seed hot state at join");
                }
                (snapshot, None)
            }
            Ok(None) => (Snapshot::empty(), None),
            Err(err) => {
                warn!(diagram = %diagram, %err, "durable load failed at join");
                (
                    Snapshot::empty(),
                    Some("diagram could not be loaded; starting from an empty canvas".to_string()),
                )
            }
        }
    }

    /// Flushes any pending durable write for the diagram immediately.
    pub async fn flush(&self, diagram: &DiagramId) {
        self.persist.flush(diagram, None).await;
    }

    /// Arms eviction of the diagram's room after the grace period, unless a
    /// session is present when the timer fires.
    pub fn schedule_eviction(self: &Arc<Self>, diagram: DiagramId) {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(engine.config.eviction_grace).await;
            match engine.presence.sessions(&diagram).await {
                Ok(sessions) if sessions.is_empty() => engine.evict(&diagram).await,
                Ok(_) => {}
                Err(err) => {
                    warn!(diagram = %diagram, %err, "presence read failed, skipping eviction")
                }
            }
        });
    }

    /// Tears down the diagram's hot state after a final flush.
    pub async fn evict(&self, diagram: &DiagramId) {
        self.rooms.barrier(diagram).await;
        self.rooms.close(diagram).await;
        self.persist.flush(diagram, None).await;
        if let Err(err) = self.state.remove(diagram).await {
            warn!(diagram = %diagram, %err, "failed to drop hot state");
        }
        self.clock.forget(diagram);
        info!(diagram = %diagram, "room evicted");
    }

    /// Flushes and tears down every open room (process shutdown).
    pub async fn shutdown(&self) {
        for diagram in self.rooms.diagrams() {
            self.evict(&diagram).await;
        }
    }

    /// Destroys a diagram: durable document, history, and every
    /// `project:{id}:*` cache key.
    pub async fn purge_diagram(&self, diagram: &DiagramId) -> EngineResult<()> {
        self.rooms.close(diagram).await;
        self.persist.cancel(diagram);
        self.clock.forget(diagram);

        if diagram.is_durable() {
            self.docs.delete_diagram(diagram).await?;
        }

        // One pattern scan takes state, presence, cursors and locks with it.
        self.presence.clear_all(diagram).await?;
        info!(diagram = %diagram, "diagram purged");
        Ok(())
    }
}
