//! # Boardsync Persistence Layer
//!
//! Store contracts and reference backends for the boardsync collaboration
//! engine.
//!
//! The collaboration runtime works against two narrow contracts:
//!
//! - **[`CacheStore`]**: a redis-shaped keyed hash store with TTL support.
//!   All hot collaboration state (diagram snapshots, presence, cursors,
//!   advisory locks) lives here under a fixed `project:{id}:*` key layout that
//!   operational tooling can inspect.
//! - **[`DocumentStore`]**: the durable home of diagram snapshots and the
//!   append-only audit history. Only durable diagram ids ever reach it.
//!
//! ## Backends
//!
//! - [`MemoryCacheStore`]: in-process hash store with lazy TTL enforcement,
//!   the default backend and the one used by tests.
//! - [`MemoryDocumentStore`]: in-process document store for tests and
//!   transient deployments.
//! - [`FileDocumentStore`]: JSON documents plus a JSON-lines history sidecar
//!   under a data directory.
//!
//! An external redis or database-backed store can be swapped in by
//! implementing the same traits; the engine never assumes more than the
//! contract surface.

pub mod cache;
pub mod document;
pub mod error;
pub mod keys;

pub use cache::{CacheStore, MemoryCacheStore};
pub use document::{DocumentStore, FileDocumentStore, MemoryDocumentStore, StoredDiagram};
pub use error::{StoreError, StoreResult};
