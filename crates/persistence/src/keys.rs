//! Cache key layout.
//!
//! The layout is stable: operational tooling inspects these keys directly,
//! so renaming them is a breaking change.

use boardsync_core::DiagramId;

/// Hash holding the hot snapshot fields of a diagram.
pub fn state_key(diagram: &DiagramId) -> String {
    format!("project:{diagram}:state")
}

/// Hash of online sessions, keyed by client id.
pub fn online_key(diagram: &DiagramId) -> String {
    format!("project:{diagram}:online")
}

/// Hash of live cursors, keyed by client id.
pub fn cursors_key(diagram: &DiagramId) -> String {
    format!("project:{diagram}:cursors")
}

/// Hash of advisory locks, keyed by entity id.
pub fn locks_key(diagram: &DiagramId) -> String {
    format!("project:{diagram}:locks")
}

/// Scan pattern matching every key of a diagram, used on deletion.
pub fn project_pattern(diagram: &DiagramId) -> String {
    format!("project:{diagram}:*")
}

/// Field names of the state hash.
pub mod state_fields {
    pub const ENTITIES: &str = "entities";
    pub const RELATIONSHIPS: &str = "relationships";
    pub const SCREENS: &str = "screens";
    pub const FLOWS: &str = "flows";
    pub const VERSION: &str = "version";
    pub const LAST_UPDATED_AT: &str = "lastUpdatedAt";
}
