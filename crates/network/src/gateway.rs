//! Per-client session gateway.
//!
//! One task per connection reads frames and dispatches them against the
//! engine; a second task drains the outbound channel into the socket so the
//! pipeline's emit order is preserved per connection.

use crate::protocol::{ClientEvent, CursorBroadcast, ServerEvent, StateSyncData};
use crate::registry::SessionRegistry;
use axum::extract::ws::{Message, WebSocket};
use boardsync_core::{DiagramId, Operation, Viewport};
use boardsync_engine::{
    CollabEngine, EngineError, LockOutcome, OperationEnvelope, UserIdentity,
};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

fn anonymous_identity() -> UserIdentity {
    UserIdentity {
        user_id: "anonymous".to_string(),
        user_name: "Anonymous".to_string(),
        user_picture: None,
    }
}

/// Per-connection state.
struct Session {
    client_id: String,
    identity: Option<UserIdentity>,
    diagram: Option<DiagramId>,
    outbound: mpsc::UnboundedSender<ServerEvent>,
    engine: Arc<CollabEngine>,
    registry: Arc<SessionRegistry>,
}

/// Drives one WebSocket connection to completion.
pub async fn handle_socket(
    socket: WebSocket,
    engine: Arc<CollabEngine>,
    registry: Arc<SessionRegistry>,
) {
    let client_id = Uuid::new_v4().to_string();
    info!(client = %client_id, "session connected");

    let (mut sink, mut stream) = socket.split();
    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ServerEvent>();

    // Single writer task per connection keeps delivery in enqueue order.
    let writer_client = client_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    warn!(client = %writer_client, %err, "dropping unserializable event");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut session = Session {
        client_id,
        identity: None,
        diagram: None,
        outbound,
        engine,
        registry,
    };

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => session.handle_frame(&text).await,
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => session.handle_frame(text).await,
                Err(_) => session.reject("binary frame is not UTF-8", None),
            },
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => break,
            Err(err) => {
                debug!(client = %session.client_id, %err, "socket error");
                break;
            }
        }
    }

    session.disconnect().await;
    // Dropping the session closes the outbound channel and ends the writer.
    drop(session);
    let _ = writer.await;
}

impl Session {
    async fn handle_frame(&mut self, text: &str) {
        match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => self.dispatch(event).await,
            Err(err) => {
                debug!(client = %self.client_id, %err, "unparseable frame");
                self.reject(&format!("unrecognized message: {err}"), None);
            }
        }
    }

    async fn dispatch(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Authenticate(identity) => self.authenticate(identity).await,
            ClientEvent::JoinProject { diagram_id } => {
                self.join_project(DiagramId::new(diagram_id)).await
            }
            ClientEvent::Operation(operation) => self.operation(operation).await,
            ClientEvent::CursorMove { x, y, viewport } => self.cursor_move(x, y, viewport).await,
            ClientEvent::RequestLock { entity_id } => self.request_lock(&entity_id).await,
            ClientEvent::ReleaseLock { entity_id } => self.release_lock(&entity_id).await,
        }
    }

    async fn authenticate(&mut self, identity: UserIdentity) {
        info!(client = %self.client_id, user = %identity.user_id, "session authenticated");
        self.identity = Some(identity.clone());

        // A session that authenticates after joining refreshes its presence
        // record under the same client id.
        if let Some(diagram) = self.diagram.clone() {
            match self
                .engine
                .presence()
                .join(&diagram, &self.client_id, &identity)
                .await
            {
                Ok(online_users) => {
                    let user = online_users
                        .iter()
                        .find(|s| s.client_id == self.client_id)
                        .cloned();
                    if let Some(user) = user {
                        self.registry.broadcast(
                            &diagram,
                            Some(&self.client_id),
                            &ServerEvent::UserJoined { user, online_users },
                        );
                    }
                }
                Err(err) => warn!(diagram = %diagram, %err, "presence refresh failed"),
            }
        }

        self.send(ServerEvent::Authenticated { success: true });
    }

    async fn join_project(&mut self, diagram: DiagramId) {
        self.leave_current_room().await;

        info!(client = %self.client_id, diagram = %diagram, "joining diagram");
        self.diagram = Some(diagram.clone());
        self.registry
            .register(&diagram, &self.client_id, self.outbound.clone());

        let identity = self.effective_identity();
        let online_users = match self
            .engine
            .presence()
            .join(&diagram, &self.client_id, &identity)
            .await
        {
            Ok(sessions) => sessions,
            Err(err) => {
                warn!(diagram = %diagram, %err, "presence join failed");
                Vec::new()
            }
        };

        let (state, warning) = self.engine.snapshot_for_join(&diagram).await;

        let locks: HashMap<_, _> = match self.engine.locks().all(&diagram).await {
            Ok(locks) => locks.into_iter().collect(),
            Err(err) => {
                warn!(diagram = %diagram, %err, "lock read failed at join");
                HashMap::new()
            }
        };

        let history = if diagram.is_durable() {
            match self.engine.history().recent(&diagram).await {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(diagram = %diagram, %err, "history read failed at join");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        self.send(ServerEvent::StateSync(Box::new(StateSyncData {
            state,
            online_users: online_users.clone(),
            locks,
            history,
            warning,
        })));

        let user = online_users
            .iter()
            .find(|s| s.client_id == self.client_id)
            .cloned();
        if let Some(user) = user {
            self.registry.broadcast(
                &diagram,
                Some(&self.client_id),
                &ServerEvent::UserJoined { user, online_users },
            );
        }
    }

    async fn operation(&mut self, mut operation: Operation) {
        let Some(diagram) = self.diagram.clone() else {
            self.reject("no diagram joined", Some(operation.id));
            return;
        };

        if let Err(err) = operation.validate() {
            debug!(client = %self.client_id, %err, "invalid operation");
            self.reject(&err.to_string(), Some(operation.id));
            return;
        }

        // The session's asserted identity is stamped over whatever the
        // payload claims; a session that never authenticated edits as
        // "anonymous" and the audit trail reflects that.
        let identity = self.effective_identity();
        operation.user_id = identity.user_id;
        operation.user_name = identity.user_name;

        let operation_id = operation.id.clone();
        let envelope = OperationEnvelope {
            operation,
            from_client: self.client_id.clone(),
            user_picture: self.identity.as_ref().and_then(|i| i.user_picture.clone()),
        };
        match self.engine.submit_operation(&diagram, envelope) {
            Ok(()) => {}
            Err(EngineError::QueueFull { .. }) => {
                self.reject("operation queue full", Some(operation_id));
            }
            Err(err) => {
                warn!(diagram = %diagram, %err, "operation submit failed");
                self.reject("diagram is unavailable", Some(operation_id));
            }
        }
    }

    async fn cursor_move(&mut self, x: f64, y: f64, viewport: Option<Viewport>) {
        let Some(diagram) = self.diagram.clone() else {
            return;
        };
        let identity = self.effective_identity();
        match self
            .engine
            .presence()
            .update_cursor(&diagram, &identity.user_id, &self.client_id, x, y, viewport)
            .await
        {
            Ok(cursor) => {
                let broadcast = CursorBroadcast::new(&self.client_id, &identity, &cursor);
                self.registry.broadcast(
                    &diagram,
                    Some(&self.client_id),
                    &ServerEvent::CursorUpdate(broadcast),
                );
            }
            Err(err) => warn!(diagram = %diagram, %err, "cursor update failed"),
        }
    }

    async fn request_lock(&mut self, entity_id: &str) {
        let Some(diagram) = self.diagram.clone() else {
            return;
        };
        let identity = self.effective_identity();
        match self
            .engine
            .locks()
            .acquire(&diagram, entity_id, &identity)
            .await
        {
            Ok(LockOutcome::Granted(lock)) => {
                self.registry.broadcast(
                    &diagram,
                    None,
                    &ServerEvent::LockAcquired {
                        entity_id: entity_id.to_string(),
                        lock,
                    },
                );
                self.send(ServerEvent::LockResult {
                    entity_id: entity_id.to_string(),
                    success: true,
                    holder: None,
                });
            }
            Ok(LockOutcome::Held(holder)) => {
                self.send(ServerEvent::LockResult {
                    entity_id: entity_id.to_string(),
                    success: false,
                    holder: Some(holder),
                });
            }
            Err(err) => {
                warn!(diagram = %diagram, %err, "lock acquire failed");
                self.send(ServerEvent::LockResult {
                    entity_id: entity_id.to_string(),
                    success: false,
                    holder: None,
                });
            }
        }
    }

    async fn release_lock(&mut self, entity_id: &str) {
        let Some(diagram) = self.diagram.clone() else {
            return;
        };
        let identity = self.effective_identity();
        match self
            .engine
            .locks()
            .release(&diagram, entity_id, &identity.user_id)
            .await
        {
            Ok(true) => {
                self.registry.broadcast(
                    &diagram,
                    None,
                    &ServerEvent::LockReleased {
                        entity_id: entity_id.to_string(),
                        user_id: identity.user_id,
                    },
                );
            }
            Ok(false) => {}
            Err(err) => warn!(diagram = %diagram, %err, "lock release failed"),
        }
    }

    async fn disconnect(&mut self) {
        info!(client = %self.client_id, "session disconnected");
        self.leave_current_room().await;
    }

    /// Leaves the joined room, if any: waits for the session's queued
    /// operations to apply, flushes pending persistence, drops presence and
    /// locks, and tells the remaining sessions.
    async fn leave_current_room(&mut self) {
        let Some(diagram) = self.diagram.take() else {
            return;
        };
        let identity = self.effective_identity();

        // Cleanup runs behind the same per-diagram queue, so an operation
        // this session already enqueued is applied before its state is torn
        // down.
        self.engine.sync(&diagram).await;
        self.engine.flush(&diagram).await;

        let online_users = match self.engine.presence().leave(&diagram, &self.client_id).await {
            Ok(sessions) => sessions,
            Err(err) => {
                warn!(diagram = %diagram, %err, "presence leave failed");
                Vec::new()
            }
        };

        if let Err(err) = self
            .engine
            .locks()
            .release_all_by_user(&diagram, &identity.user_id)
            .await
        {
            warn!(diagram = %diagram, %err, "lock cleanup failed");
        }

        self.registry.unregister(&diagram, &self.client_id);
        self.registry.broadcast(
            &diagram,
            Some(&self.client_id),
            &ServerEvent::UserLeft {
                client_id: self.client_id.clone(),
                user_id: identity.user_id,
                user_name: identity.user_name,
                online_users,
            },
        );

        self.engine.schedule_eviction(diagram);
    }

    fn effective_identity(&self) -> UserIdentity {
        self.identity.clone().unwrap_or_else(anonymous_identity)
    }

    fn reject(&self, reason: &str, operation_id: Option<String>) {
        self.send(ServerEvent::OpRejected {
            reason: reason.to_string(),
            operation_id,
        });
    }

    fn send(&self, event: ServerEvent) {
        // A closed channel means the writer is gone and the connection is
        // tearing down; nothing to do.
        let _ = self.outbound.send(event);
    }
}
