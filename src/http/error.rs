//! Error taxonomy for request handling.
//!
//! # Design Decisions
//! - Every failure maps to a well-formed HTTP response; nothing escapes to the transport
//! - User-defined status errors keep their status and message
//! - Everything else collapses to a generic 500 so internals never leak

use axum::http::{Method, StatusCode};
use thiserror::Error;

use crate::http::eventsource::EventSourceError;
use crate::http::response::Response;
use crate::http::websocket::WebSocketError;

/// Body sent for any failure that is not a user-defined status error.
pub const INTERNAL_ERROR_BODY: &str = "Internal Server Error";

/// Body sent when no route matches.
pub const NOT_FOUND_BODY: &str = "404 Not Found";

/// Failure raised by a handler, a middleware hook, or caught by the sandbox.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Application-defined error response.
    #[error("{status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    WebSocket(#[from] WebSocketError),

    #[error(transparent)]
    EventSource(#[from] EventSourceError),

    #[error(transparent)]
    Failed(Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// An error answered with `status` and `message` verbatim.
    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Wrap any error; answered with a generic 500.
    pub fn other<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Failed(error.into())
    }

    /// The response a client receives for this failure.
    pub fn into_response(self) -> Response {
        match self {
            Self::Status { status, message } => Response::text(status, message),
            _ => Response::internal_error(),
        }
    }
}

/// Outcome of a dispatch that did not produce a handler response.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no route for {method} {path}")]
    NotFound { method: Method, path: String },

    #[error("handler failed: {0}")]
    HandlerFailure(#[from] HandlerError),
}

impl DispatchError {
    pub fn into_response(self) -> Response {
        match self {
            Self::NotFound { .. } => Response::not_found(),
            Self::HandlerFailure(error) => error.into_response(),
        }
    }
}
