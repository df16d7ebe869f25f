//! # Boardsync Network
//!
//! The session boundary of boardsync: a WebSocket gateway that
//! authenticates sessions, routes them into diagram rooms, feeds their
//! operations to the collaboration engine, and fans engine output back to
//! every other connected session.
//!
//! ## Architecture
//!
//! - **[`protocol`]**: tagged `{event, data}` wire messages, both directions
//! - **[`gateway`]**: one reader task + one ordered writer task per connection
//! - **[`registry`]**: diagram-room membership used for fan-out; implements
//!   the engine's [`OperationFanout`](boardsync_engine::OperationFanout) sink
//! - **[`server`]**: axum router (`/ws` upgrade, `/health`) with the CORS
//!   origin allowlist
//! - **[`config`]**: env-driven server configuration
//!
//! Identity is taken from the `authenticate` message as asserted;
//! cryptographic verification happens before the socket is established and
//! is out of scope here.

pub mod config;
pub mod error;
pub mod gateway;
pub mod protocol;
pub mod registry;
pub mod server;

pub use config::{OriginAllowlist, ServerConfig, DEFAULT_PORT, MAX_MESSAGE_BYTES};
pub use error::{NetworkError, NetworkResult};
pub use protocol::{
    ClientEvent, CursorBroadcast, OperationBroadcast, ServerEvent, StateSyncData,
};
pub use registry::SessionRegistry;
pub use server::{AppState, CollabServer};
