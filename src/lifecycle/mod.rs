//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Route tree → RouteTable → Bind listener → Spawn server
//!
//! Shutdown (shutdown.rs):
//!     Trigger → Stop accepting → Close sessions → Drain connections
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: routes first, listener last
//! - Ordered shutdown: stop accept, close sessions, drain
//! - Session drain has a deadline (`websocket.close_timeout_ms`)

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
pub use startup::{Runner, StartupError};
