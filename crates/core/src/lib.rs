//! # Boardsync Core
//!
//! Core data model and ordering primitives for the boardsync real-time
//! collaboration engine.
//!
//! This crate defines the diagram data model shared by every other boardsync
//! crate: snapshots, entities, relationships, screens and flows, the tagged
//! operation union that clients submit, the per-diagram Lamport clock, and the
//! last-writer-wins comparison used to resolve concurrent edits.
//!
//! ## Features
//!
//! - **Diagram Model**: Versioned snapshots with ordered entity, relationship,
//!   screen and flow sequences
//! - **Operations**: Type-safe tagged operation union matching the wire format
//! - **Lamport Clock**: Per-diagram logical clock with merge-on-receive
//! - **LWW Policy**: `(lamport_clock, wall_clock)` comparison helper for
//!   clients and replay tooling
//!
//! ## Architecture
//!
//! The model is deliberately free of I/O: everything here is plain data plus
//! pure functions. The collaboration runtime in `boardsync-engine` owns all
//! side effects and serializes mutation per diagram; this crate only has to
//! guarantee that the data structures are deterministic to apply and cheap to
//! clone.

pub mod clock;
pub mod diagram;
pub mod error;
pub mod history;
pub mod model;
pub mod operation;

pub use clock::{should_apply, LamportClock};
pub use diagram::DiagramId;
pub use error::{CoreError, CoreResult};
pub use history::HistoryEntry;
pub use model::{
    Attribute, AttributePatch, Entity, EntityPatch, Flow, FlowPatch, Position, RelationKind,
    Relationship, RelationshipPatch, Screen, ScreenPatch, Snapshot, Viewport,
};
pub use operation::{
    AttributeFieldPayload, AttributeListPayload, ErdImportPayload, MovePayload, Operation,
    OperationBody, OperationKind, ScreenImportPayload, TargetType,
};

/// Returns the current wall clock in milliseconds since the Unix epoch.
pub fn wall_clock_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
