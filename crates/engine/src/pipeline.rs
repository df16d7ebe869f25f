//! Per-diagram serial operation pipeline.
//!
//! Every active diagram has one long-lived worker task fed by a bounded FIFO
//! channel. Operations from different clients arrive concurrently but are
//! applied in arrival order per diagram; there is no cross-diagram
//! coordination. The worker owns the merge, read, apply and write-back
//! critical section; fan-out, persistence scheduling and history append run
//! on the same loop iteration before the next command is dequeued.

use crate::apply::apply;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::history::HistoryLog;
use crate::persist::PersistenceWriter;
use crate::presence::ClientId;
use crate::state::StateStore;
use async_trait::async_trait;
use boardsync_core::{wall_clock_ms, DiagramId, HistoryEntry, LamportClock, Operation, Snapshot};
use boardsync_persistence::DocumentStore;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// An operation as broadcast to the other sessions of a diagram.
#[derive(Debug, Clone)]
pub struct AppliedOperation {
    pub operation: Operation,
    /// Server wall time of the apply, milliseconds since the Unix epoch.
    pub applied_at: u64,
    /// Snapshot version after the apply.
    pub version: u64,
}

/// Fan-out sink the pipeline emits into.
///
/// Implemented by the session gateway; the engine stays transport-agnostic.
/// Calls for one diagram arrive in apply order.
#[async_trait]
pub trait OperationFanout: Send + Sync {
    /// Deliver `applied` to every session of `diagram` except `exclude`.
    async fn operation_applied(
        &self,
        diagram: &DiagramId,
        exclude: &ClientId,
        applied: &AppliedOperation,
    );
}

/// No-op fan-out for tooling and tests that only exercise the state machine.
pub struct NullFanout;

#[async_trait]
impl OperationFanout for NullFanout {
    async fn operation_applied(
        &self,
        _diagram: &DiagramId,
        _exclude: &ClientId,
        _applied: &AppliedOperation,
    ) {
    }
}

/// An operation together with its originating session.
#[derive(Debug)]
pub struct OperationEnvelope {
    pub operation: Operation,
    pub from_client: ClientId,
    /// Avatar of the author, carried into the audit entry.
    pub user_picture: Option<String>,
}

enum RoomCommand {
    Operation(Box<OperationEnvelope>),
    /// Acknowledged once every previously queued command has been processed.
    Barrier(oneshot::Sender<()>),
    Shutdown,
}

pub(crate) struct RoomServices {
    pub clock: Arc<LamportClock>,
    pub state: Arc<StateStore>,
    pub persist: Arc<PersistenceWriter>,
    pub history: Arc<HistoryLog>,
    pub docs: Arc<dyn DocumentStore>,
    pub fanout: Arc<dyn OperationFanout>,
}

/// Registry of live room workers, keyed by diagram.
pub struct Rooms {
    map: Arc<DashMap<DiagramId, mpsc::Sender<RoomCommand>>>,
    services: Arc<RoomServices>,
    config: EngineConfig,
}

impl Rooms {
    pub(crate) fn new(services: Arc<RoomServices>, config: EngineConfig) -> Self {
        Self {
            map: Arc::new(DashMap::new()),
            services,
            config,
        }
    }

    /// Queues an operation for the diagram's worker, spawning the room on
    /// first use. A full queue rejects the operation; a dead worker is
    /// replaced once before giving up.
    pub fn submit(&self, diagram: &DiagramId, envelope: OperationEnvelope) -> EngineResult<()> {
        let command = RoomCommand::Operation(Box::new(envelope));
        match self.sender(diagram).try_send(command) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(EngineError::QueueFull {
                diagram: diagram.clone(),
                depth: self.config.max_queue_depth,
            }),
            Err(mpsc::error::TrySendError::Closed(command)) => {
                // The worker died (shutdown race or panic); replace it and
                // retry once. The replacement starts with a fresh clock.
                self.map.remove(diagram);
                self.services.clock.forget(diagram);
                self.sender(diagram)
                    .try_send(command)
                    .map_err(|_| EngineError::RoomClosed {
                        diagram: diagram.clone(),
                    })
            }
        }
    }

    /// Resolves once every command queued before the call has been processed.
    /// Returns immediately when the diagram has no live room.
    pub async fn barrier(&self, diagram: &DiagramId) {
        let Some(tx) = self.map.get(diagram).map(|entry| entry.value().clone()) else {
            return;
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if tx.send(RoomCommand::Barrier(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Stops the diagram's worker after it drains already-queued commands.
    pub async fn close(&self, diagram: &DiagramId) {
        if let Some((_, tx)) = self.map.remove(diagram) {
            let _ = tx.send(RoomCommand::Shutdown).await;
        }
    }

    /// Diagrams with a live worker.
    pub fn diagrams(&self) -> Vec<DiagramId> {
        self.map.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of live rooms.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn sender(&self, diagram: &DiagramId) -> mpsc::Sender<RoomCommand> {
        if let Some(tx) = self.map.get(diagram) {
            return tx.value().clone();
        }

        let (tx, rx) = mpsc::channel(self.config.max_queue_depth);
        let entry = self.map.entry(diagram.clone()).or_insert_with(|| {
            let services = Arc::clone(&self.services);
            let map = Arc::clone(&self.map);
            let room_diagram = diagram.clone();
            let worker = tokio::spawn(run_room(room_diagram.clone(), rx, services));

            let watch_map = map;
            let watch_clock = Arc::clone(&self.services.clock);
            tokio::spawn(async move {
                match worker.await {
                    Ok(()) => debug!(diagram = %room_diagram, "room worker stopped"),
                    Err(err) if err.is_panic() => {
                        // One diagram's crash must not take down the others;
                        // the next operation re-creates the room with an
                        // empty clock.
                        error!(diagram = %room_diagram, "room worker panicked");
                        watch_clock.forget(&room_diagram);
                    }
                    Err(err) => warn!(diagram = %room_diagram, %err, "room worker aborted"),
                }
                watch_map.remove(&room_diagram);
            });

            info!(diagram = %diagram, "room opened");
            tx
        });
        entry.value().clone()
    }
}

async fn run_room(
    diagram: DiagramId,
    mut rx: mpsc::Receiver<RoomCommand>,
    services: Arc<RoomServices>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            RoomCommand::Operation(envelope) => {
                process_operation(&diagram, *envelope, &services).await;
            }
            RoomCommand::Barrier(ack) => {
                let _ = ack.send(());
            }
            RoomCommand::Shutdown => break,
        }
    }
}

async fn process_operation(
    diagram: &DiagramId,
    envelope: OperationEnvelope,
    services: &Arc<RoomServices>,
) {
    let OperationEnvelope {
        operation,
        from_client,
        user_picture,
    } = envelope;

    // 1. Merge the sender's clock.
    let merged_clock = services.clock.merge(diagram, operation.lamport_clock);

    // 2. Read the hot snapshot, falling back to durable storage or empty.
    let snapshot = match services.state.get(diagram).await {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => {
            let loaded = load_durable_or_empty(diagram, services).await;
            if let Err(err) = services.state.init_from_durable(diagram, &loaded).await {
                warn!(diagram = %diagram, %err, "failed to seed hot state");
            }
            loaded
        }
        Err(err) => {
            warn!(diagram = %diagram, %err, "hot state read failed, applying on durable copy");
            load_durable_or_empty(diagram, services).await
        }
    };

    // 3. Apply.
    let next = apply(snapshot, &operation);

    // 4. Write back.
    if let Err(err) = services.state.put(diagram, &next).await {
        warn!(diagram = %diagram, %err, "hot state write failed");
    }

    debug!(
        diagram = %diagram,
        kind = %operation.kind(),
        version = next.version,
        clock = merged_clock,
        "operation applied"
    );

    // 5. Fan out to everyone except the author's session.
    let applied = AppliedOperation {
        applied_at: wall_clock_ms(),
        version: next.version,
        operation,
    };
    services
        .fanout
        .operation_applied(diagram, &from_client, &applied)
        .await;

    // 6. Persist: critical operations flush now, the rest debounce.
    if applied.operation.kind().is_critical() {
        services.persist.flush(diagram, Some(next)).await;
    } else {
        services.persist.debounce(diagram.clone(), next);
    }

    // 7. Audit, best effort.
    if diagram.is_durable() {
        let entry =
            HistoryEntry::for_operation(diagram, &applied.operation, merged_clock, user_picture);
        services.history.append(entry).await;
    }
}

pub(crate) async fn load_durable_or_empty(
    diagram: &DiagramId,
    services: &Arc<RoomServices>,
) -> Snapshot {
    if !diagram.is_durable() {
        return Snapshot::empty();
    }
    let load = services.docs.load_diagram(diagram);
    match tokio::time::timeout(crate::config::DURABLE_IO_TIMEOUT, load).await {
        Ok(Ok(Some(snapshot))) => snapshot,
        Ok(Ok(None)) => Snapshot::empty(),
        Ok(Err(err)) => {
            warn!(diagram = %diagram, %err, "durable load failed, starting empty");
            Snapshot::empty()
        }
        Err(_) => {
            warn!(diagram = %diagram, "durable load timed out, starting empty");
            Snapshot::empty()
        }
    }
}
