//! Wire protocol between the core and its clients.
//!
//! Every frame is a tagged record `{event, data}`. Inbound and outbound
//! events are separate enums because the two directions share almost no
//! shapes; both serialize through the same adjacently tagged layout.

use boardsync_core::{HistoryEntry, Operation, Snapshot, Viewport};
use boardsync_engine::{AppliedOperation, CursorRecord, LockRecord, SessionRecord, UserIdentity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Messages a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Assert identity for this session.
    Authenticate(UserIdentity),
    /// Join a diagram room, leaving any previous room.
    #[serde(rename_all = "camelCase")]
    JoinProject { diagram_id: String },
    /// Submit an edit operation for the joined diagram.
    Operation(Operation),
    /// Report the cursor position (and optionally the viewport).
    CursorMove {
        x: f64,
        y: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        viewport: Option<Viewport>,
    },
    /// Request the advisory lock on an element.
    #[serde(rename_all = "camelCase")]
    RequestLock { entity_id: String },
    /// Release a previously acquired advisory lock.
    #[serde(rename_all = "camelCase")]
    ReleaseLock { entity_id: String },
}

/// Initial state delivered to a joining session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSyncData {
    pub state: Snapshot,
    pub online_users: Vec<SessionRecord>,
    /// Live advisory locks, keyed by entity id.
    pub locks: HashMap<String, LockRecord>,
    /// Recent audit entries, most recent first, capped at 100.
    pub history: Vec<HistoryEntry>,
    /// Set when the durable copy could not be loaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// An applied operation as fanned out to the other sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationBroadcast {
    #[serde(flatten)]
    pub operation: Operation,
    /// Server wall time of the apply, milliseconds since the Unix epoch.
    pub applied_at: u64,
    /// Snapshot version after the apply.
    pub version: u64,
}

impl From<AppliedOperation> for OperationBroadcast {
    fn from(applied: AppliedOperation) -> Self {
        Self {
            operation: applied.operation,
            applied_at: applied.applied_at,
            version: applied.version,
        }
    }
}

/// A cursor update as fanned out to the other sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorBroadcast {
    pub client_id: String,
    pub user_id: String,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_picture: Option<String>,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
    pub last_updated: u64,
}

impl CursorBroadcast {
    pub fn new(client_id: &str, identity: &UserIdentity, cursor: &CursorRecord) -> Self {
        Self {
            client_id: client_id.to_string(),
            user_id: cursor.user_id.clone(),
            user_name: identity.user_name.clone(),
            user_picture: identity.user_picture.clone(),
            x: cursor.x,
            y: cursor.y,
            viewport: cursor.viewport,
            last_updated: cursor.last_updated,
        }
    }
}

/// Messages the server may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Reply to `authenticate`.
    Authenticated { success: bool },
    /// Private reply to `join_project`.
    StateSync(Box<StateSyncData>),
    /// A session joined the diagram.
    #[serde(rename_all = "camelCase")]
    UserJoined {
        user: SessionRecord,
        online_users: Vec<SessionRecord>,
    },
    /// A session left the diagram.
    #[serde(rename_all = "camelCase")]
    UserLeft {
        client_id: String,
        user_id: String,
        user_name: String,
        online_users: Vec<SessionRecord>,
    },
    /// Fan-out of another session's applied operation.
    Operation(Box<OperationBroadcast>),
    /// Fan-out of another session's cursor.
    CursorUpdate(CursorBroadcast),
    /// An advisory lock was granted.
    #[serde(rename_all = "camelCase")]
    LockAcquired { entity_id: String, lock: LockRecord },
    /// An advisory lock was released.
    #[serde(rename_all = "camelCase")]
    LockReleased { entity_id: String, user_id: String },
    /// Private reply to `request_lock`.
    #[serde(rename_all = "camelCase")]
    LockResult {
        entity_id: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        holder: Option<LockRecord>,
    },
    /// The operation was dropped; it is not broadcast.
    #[serde(rename_all = "camelCase")]
    OpRejected {
        reason: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        operation_id: Option<String>,
    },
}
