//! Diagram identifiers and durability classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Id prefixes that mark a diagram as transient. Transient diagrams are valid
/// session targets but are never read from or written to the document store.
pub const TRANSIENT_PREFIXES: &[&str] = &["local_", "proj_"];

/// Opaque diagram identifier.
///
/// Two shapes exist on the wire: durable document ids referring to persisted
/// diagrams, and transient ids prefixed with `local_` or `proj_` that clients
/// use to prototype before the first save.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiagramId(String);

impl DiagramId {
    /// Creates a diagram id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id refers to a persisted document.
    ///
    /// Transient ids (empty, or carrying one of [`TRANSIENT_PREFIXES`]) never
    /// reach the document store.
    pub fn is_durable(&self) -> bool {
        !self.0.is_empty()
            && !TRANSIENT_PREFIXES
                .iter()
                .any(|prefix| self.0.starts_with(prefix))
    }
}

impl fmt::Display for DiagramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DiagramId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for DiagramId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}
