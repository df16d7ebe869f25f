//! Connection registry and fan-out.

use crate::protocol::{OperationBroadcast, ServerEvent};
use async_trait::async_trait;
use boardsync_core::DiagramId;
use boardsync_engine::{AppliedOperation, ClientId, OperationFanout};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

/// Outbound channel of one connection. A dedicated writer task drains it, so
/// per-connection delivery order is exactly enqueue order.
pub type OutboundSender = mpsc::UnboundedSender<ServerEvent>;

/// Live connections grouped by diagram room.
///
/// Membership changes are ordered with respect to join and disconnect
/// handling by the gateway, so a broadcast never misses a registered session
/// or double-delivers.
#[derive(Default)]
pub struct SessionRegistry {
    rooms: DashMap<DiagramId, DashMap<ClientId, OutboundSender>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection to a diagram room.
    pub fn register(&self, diagram: &DiagramId, client_id: &str, sender: OutboundSender) {
        self.rooms
            .entry(diagram.clone())
            .or_default()
            .insert(client_id.to_string(), sender);
    }

    /// Removes a connection from a diagram room.
    pub fn unregister(&self, diagram: &DiagramId, client_id: &str) {
        let mut drop_room = false;
        if let Some(room) = self.rooms.get(diagram) {
            room.remove(client_id);
            drop_room = room.is_empty();
        }
        if drop_room {
            self.rooms.remove_if(diagram, |_, room| room.is_empty());
        }
    }

    /// Sends an event to every session of the diagram, except `exclude`.
    pub fn broadcast(&self, diagram: &DiagramId, exclude: Option<&str>, event: &ServerEvent) {
        let Some(room) = self.rooms.get(diagram) else {
            return;
        };
        for connection in room.iter() {
            if exclude == Some(connection.key().as_str()) {
                continue;
            }
            // A closed receiver means the connection is tearing down; the
            // disconnect path unregisters it.
            if connection.value().send(event.clone()).is_err() {
                debug!(diagram = %diagram, client = %connection.key(), "dropping send to closed session");
            }
        }
    }

    /// Sessions currently registered for a diagram.
    pub fn room_size(&self, diagram: &DiagramId) -> usize {
        self.rooms.get(diagram).map(|room| room.len()).unwrap_or(0)
    }

    /// Total connections across all rooms.
    pub fn connection_count(&self) -> usize {
        self.rooms.iter().map(|room| room.len()).sum()
    }
}

#[async_trait]
impl OperationFanout for SessionRegistry {
    async fn operation_applied(
        &self,
        diagram: &DiagramId,
        exclude: &ClientId,
        applied: &AppliedOperation,
    ) {
        let event = ServerEvent::Operation(Box::new(OperationBroadcast::from(applied.clone())));
        self.broadcast(diagram, Some(exclude.as_str()), &event);
    }
}
