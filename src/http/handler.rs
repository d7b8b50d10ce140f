//! Handler interfaces, one per protocol class.
//!
//! # Handler kinds
//! ```text
//! HttpHandler         &mut CleanRoom            → Reply
//! WebSocketHandler    (CleanRoom, WebSocket)    → runs for the connection lifetime
//! EventSourceHandler  (CleanRoom, EventSink)    → runs until the stream ends
//! ```
//!
//! Plain functions and closures implement these traits through blanket
//! impls, so routes can be declared with `fn` items directly.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::http::clean_room::CleanRoom;
use crate::http::error::HandlerError;
use crate::http::eventsource::EventSink;
use crate::http::request::Protocol;
use crate::http::response::Response;
use crate::http::websocket::WebSocket;

/// What a plain handler produces.
#[derive(Debug)]
pub enum Reply {
    /// A complete response, sent as-is.
    Response(Response),
    /// A body; status and headers come from the clean room.
    Body(Bytes),
}

/// Conversion of handler return values into a [`Reply`].
pub trait IntoReply {
    fn into_reply(self) -> Result<Reply, HandlerError>;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Result<Reply, HandlerError> {
        Ok(self)
    }
}

impl IntoReply for Response {
    fn into_reply(self) -> Result<Reply, HandlerError> {
        Ok(Reply::Response(self))
    }
}

impl IntoReply for Bytes {
    fn into_reply(self) -> Result<Reply, HandlerError> {
        Ok(Reply::Body(self))
    }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Result<Reply, HandlerError> {
        Ok(Reply::Body(Bytes::from_static(self.as_bytes())))
    }
}

impl IntoReply for String {
    fn into_reply(self) -> Result<Reply, HandlerError> {
        Ok(Reply::Body(Bytes::from(self)))
    }
}

impl IntoReply for Vec<u8> {
    fn into_reply(self) -> Result<Reply, HandlerError> {
        Ok(Reply::Body(Bytes::from(self)))
    }
}

impl IntoReply for () {
    fn into_reply(self) -> Result<Reply, HandlerError> {
        Ok(Reply::Body(Bytes::new()))
    }
}

impl<T, E> IntoReply for Result<T, E>
where
    T: IntoReply,
    E: Into<HandlerError>,
{
    fn into_reply(self) -> Result<Reply, HandlerError> {
        self.map_err(Into::into)?.into_reply()
    }
}

/// Request/response handler.
#[async_trait]
pub trait HttpHandler: Send + Sync {
    async fn call(&self, room: &mut CleanRoom) -> Result<Reply, HandlerError>;
}

#[async_trait]
impl<F, R> HttpHandler for F
where
    F: Fn(&mut CleanRoom) -> R + Send + Sync,
    R: IntoReply,
{
    async fn call(&self, room: &mut CleanRoom) -> Result<Reply, HandlerError> {
        self(room).into_reply()
    }
}

/// Long-lived handler owning an upgraded WebSocket connection.
#[async_trait]
pub trait WebSocketHandler: Send + Sync {
    async fn call(&self, room: CleanRoom, socket: WebSocket) -> Result<(), HandlerError>;
}

#[async_trait]
impl<F, Fut> WebSocketHandler for F
where
    F: Fn(CleanRoom, WebSocket) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn call(&self, room: CleanRoom, socket: WebSocket) -> Result<(), HandlerError> {
        self(room, socket).await
    }
}

/// Long-lived handler pushing events to a client.
#[async_trait]
pub trait EventSourceHandler: Send + Sync {
    async fn call(&self, room: CleanRoom, sink: EventSink) -> Result<(), HandlerError>;
}

#[async_trait]
impl<F, Fut> EventSourceHandler for F
where
    F: Fn(CleanRoom, EventSink) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn call(&self, room: CleanRoom, sink: EventSink) -> Result<(), HandlerError> {
        self(room, sink).await
    }
}

/// A route's handler, tagged with its protocol class.
#[derive(Clone)]
pub enum Handler {
    Http(Arc<dyn HttpHandler>),
    WebSocket(Arc<dyn WebSocketHandler>),
    EventSource(Arc<dyn EventSourceHandler>),
}

impl Handler {
    pub fn http<H: HttpHandler + 'static>(handler: H) -> Self {
        Self::Http(Arc::new(handler))
    }

    pub fn websocket<H: WebSocketHandler + 'static>(handler: H) -> Self {
        Self::WebSocket(Arc::new(handler))
    }

    pub fn eventsource<H: EventSourceHandler + 'static>(handler: H) -> Self {
        Self::EventSource(Arc::new(handler))
    }

    /// True when this handler is built for requests of `protocol`.
    pub fn serves(&self, protocol: Protocol) -> bool {
        matches!(
            (self, protocol),
            (Self::Http(_), Protocol::Http)
                | (Self::WebSocket(_), Protocol::WebSocket)
                | (Self::EventSource(_), Protocol::EventSource)
        )
    }

    /// True when this handler may still answer a `protocol` request that no
    /// route of its own class matched: plain handlers serve upgrade and
    /// event-stream requests as plain HTTP, WebSocket handlers answer plain
    /// requests with 426.
    pub fn answers(&self, protocol: Protocol) -> bool {
        match self {
            Self::Http(_) => true,
            Self::WebSocket(_) => protocol == Protocol::Http,
            Self::EventSource(_) => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::WebSocket(_) => "websocket",
            Self::EventSource(_) => "eventsource",
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handler::{}", self.kind())
    }
}
