//! Transport-independent request representation.
//!
//! # Responsibilities
//! - Carry method, path, query, headers and buffered body to handlers
//! - Hold the parameters extracted by the matched route
//! - Classify the protocol the client is asking for
//!
//! # Design Decisions
//! - Body is fully buffered (`Bytes`) before dispatch; cheap to clone
//! - Header lookups are case-insensitive (`HeaderMap`)

use axum::http::{header, HeaderMap, HeaderValue, Method};
use bytes::Bytes;

use crate::routing::Params;

/// Protocol class requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    WebSocket,
    EventSource,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::WebSocket => "websocket",
            Self::EventSource => "eventsource",
        }
    }
}

/// A parsed request as seen by middleware and handlers.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub params: Params,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: Params::new(),
        }
    }

    /// Split a request target (`/path?query`) into path and query.
    pub fn from_target(method: Method, target: &str) -> Self {
        let mut request = match target.split_once('?') {
            Some((path, query)) => {
                let mut request = Self::new(method, path);
                request.query = Some(query.to_string());
                request
            }
            None => Self::new(method, target),
        };
        if request.path.is_empty() {
            request.path.push('/');
        }
        request
    }

    pub fn with_header(mut self, name: header::HeaderName, value: &'static str) -> Self {
        self.headers.insert(name, HeaderValue::from_static(value));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// A route parameter extracted from the path.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Header value as a string, if present and valid ASCII.
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Body as UTF-8 text (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Classify the request by its headers.
    ///
    /// WebSocket: `Upgrade: websocket` together with an `upgrade` token in
    /// `Connection`. EventSource: `Accept` lists `text/event-stream`.
    pub fn protocol(&self) -> Protocol {
        if self.is_websocket_upgrade() {
            Protocol::WebSocket
        } else if self.accepts_event_stream() {
            Protocol::EventSource
        } else {
            Protocol::Http
        }
    }

    fn is_websocket_upgrade(&self) -> bool {
        let upgrade = self
            .header(header::UPGRADE)
            .map(|v| v.trim().eq_ignore_ascii_case("websocket"))
            .unwrap_or(false);
        let connection = self
            .header(header::CONNECTION)
            .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("upgrade")))
            .unwrap_or(false);
        upgrade && connection
    }

    fn accepts_event_stream(&self) -> bool {
        self.header(header::ACCEPT)
            .map(|v| {
                v.split(',')
                    .any(|t| t.trim().to_ascii_lowercase().starts_with("text/event-stream"))
            })
            .unwrap_or(false)
    }
}
