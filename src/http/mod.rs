//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum transport, body buffering, request ID)
//!     → dispatcher.rs (route lookup, protocol branch)
//!         → middleware.rs (before hooks, in chain order)
//!         → handler.rs (plain / WebSocket / EventSource), inside sandbox.rs
//!         → middleware.rs (after hooks)
//!     → response.rs, websocket/ (upgrade), eventsource.rs (stream)
//!     → Send to client
//! ```

pub mod clean_room;
pub mod dispatcher;
pub mod error;
pub mod eventsource;
pub mod handler;
pub mod middleware;
pub mod request;
pub mod response;
pub mod sandbox;
pub mod server;
pub mod websocket;

pub use clean_room::CleanRoom;
pub use dispatcher::{Dispatch, Dispatcher};
pub use error::{DispatchError, HandlerError};
pub use eventsource::{EventSink, EventSourceError, EventStream};
pub use handler::{EventSourceHandler, Handler, HttpHandler, IntoReply, Reply, WebSocketHandler};
pub use middleware::{Flow, Middleware};
pub use request::{Protocol, Request};
pub use response::Response;
pub use sandbox::Sandbox;
pub use server::Server;
pub use websocket::{Message, WebSocket};
