//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Upgraded WebSocket / open EventSource stream
//!     → connection.rs (id, per-kind gauge, guard released on drop)
//!     → ConnectionTracker::wait_idle during shutdown
//! ```
//!
//! Accepting sockets and HTTP parsing belong to the transport
//! (`http::server`); this layer only tracks long-lived sessions.

pub mod connection;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker, SessionKind};
