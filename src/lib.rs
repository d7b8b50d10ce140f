//! switchyard: a small routing web framework with WebSocket and
//! EventSource endpoints, built on Tokio and Axum.

pub mod config;
pub mod demo;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

pub use config::ServerConfig;
pub use http::{CleanRoom, Dispatcher, Middleware, Request, Response, Server};
pub use lifecycle::{Runner, Shutdown};
pub use routing::{RouteGroup, RouteTable};
