//! Server-sent events (EventSource).
//!
//! # Wire Format
//! ```text
//! send("Hello")                →  data: Hello\n
//! send("a\nb")                 →  data: a\ndata: b\n
//! send_event("tick", "1")      →  event: tick\ndata: 1\n
//! handler finished             →  \n
//! ```

use std::convert::Infallible;
use std::fmt::Display;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use bytes::Bytes;
use futures_util::stream::{self, Stream};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::http::response::Response;

/// Fixed headers of every event-stream response.
pub const EVENTSOURCE_HEADERS: [(HeaderName, &str); 2] = [
    (header::CONTENT_TYPE, "text/event-stream"),
    (header::CACHE_CONTROL, "no-cache"),
];

/// Terminator written once the handler is done.
pub const STREAM_TERMINATOR: &[u8] = b"\n";

#[derive(Debug, Error)]
pub enum EventSourceError {
    #[error("event stream is closed")]
    Closed,

    #[error("event name {0:?} contains a line break")]
    InvalidEventName(String),
}

/// Handler-side writer for an event stream.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<Bytes>,
}

impl EventSink {
    /// Push one event; every line of `value` becomes a `data:` line.
    pub async fn send(&self, value: impl Display) -> Result<(), EventSourceError> {
        self.write(encode(None, &value.to_string())).await
    }

    /// Push one named event. Names must fit on the `event:` line.
    pub async fn send_event(&self, name: &str, value: impl Display) -> Result<(), EventSourceError> {
        if name.contains(['\r', '\n']) {
            return Err(EventSourceError::InvalidEventName(name.to_string()));
        }
        self.write(encode(Some(name), &value.to_string())).await
    }

    /// True once the client is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the client is gone.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    pub(crate) async fn finish(self) {
        let _ = self.tx.send(Bytes::from_static(STREAM_TERMINATOR)).await;
    }

    async fn write(&self, chunk: Bytes) -> Result<(), EventSourceError> {
        self.tx.send(chunk).await.map_err(|_| EventSourceError::Closed)
    }
}

/// The 200 response plus the receiving end of the event body.
pub struct EventStream {
    pub response: Response,
    body: mpsc::Receiver<Bytes>,
}

impl EventStream {
    /// Create a connected sink and stream with a bounded buffer.
    pub fn channel(buffer: usize) -> (EventSink, EventStream) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let stream = EventStream {
            response: stream_response(),
            body: rx,
        };
        (EventSink { tx }, stream)
    }

    /// Split into the response head and the body chunks, in the order they
    /// were sent. The body ends when every sink is dropped.
    pub fn into_parts(
        self,
    ) -> (
        Response,
        impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static,
    ) {
        let body = stream::unfold(self.body, |mut rx| async move {
            rx.recv().await.map(|chunk| (Ok(chunk), rx))
        });
        (self.response, body)
    }

    /// Wait for the next chunk.
    pub async fn next_chunk(&mut self) -> Option<Bytes> {
        self.body.recv().await
    }
}

fn stream_response() -> Response {
    let mut headers = HeaderMap::with_capacity(EVENTSOURCE_HEADERS.len());
    for (name, value) in EVENTSOURCE_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
    Response::new(StatusCode::OK, headers, Bytes::new())
}

fn encode(name: Option<&str>, value: &str) -> Bytes {
    let mut out = String::with_capacity(value.len() + 8);
    if let Some(name) = name {
        out.push_str("event: ");
        out.push_str(name);
        out.push('\n');
    }
    if value.is_empty() {
        out.push_str("data: \n");
    }
    for line in value.lines() {
        out.push_str("data: ");
        out.push_str(line);
        out.push('\n');
    }
    Bytes::from(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    async fn collect(stream: EventStream) -> String {
        let (_, body) = stream.into_parts();
        let chunks: Vec<_> = body.collect().await;
        let bytes: Vec<u8> = chunks
            .into_iter()
            .flat_map(|c| c.map(|b| b.to_vec()).unwrap_or_default())
            .collect();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_encoding() {
        assert_eq!(encode(None, "Hello"), "data: Hello\n");
        assert_eq!(encode(None, "a\nb"), "data: a\ndata: b\n");
        assert_eq!(encode(Some("tick"), "1"), "event: tick\ndata: 1\n");
        assert_eq!(encode(None, ""), "data: \n");
    }

    #[test]
    fn test_response_headers() {
        let (_sink, stream) = EventStream::channel(4);
        assert_eq!(stream.response.status(), StatusCode::OK);
        assert_eq!(stream.response.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(stream.response.headers()[header::CACHE_CONTROL], "no-cache");
    }

    #[tokio::test]
    async fn test_hello_world_body() {
        let (sink, stream) = EventStream::channel(4);
        tokio::spawn(async move {
            sink.send("Hello").await.unwrap();
            sink.send("World").await.unwrap();
            sink.finish().await;
        });
        assert_eq!(collect(stream).await, "data: Hello\ndata: World\n\n");
    }

    #[tokio::test]
    async fn test_event_name_with_line_break_rejected() {
        let (sink, mut stream) = EventStream::channel(4);
        for name in ["tick\ndata: forged", "tick\r"] {
            assert!(matches!(
                sink.send_event(name, "1").await,
                Err(EventSourceError::InvalidEventName(_))
            ));
        }
        sink.send_event("tick", "1").await.unwrap();
        drop(sink);
        assert_eq!(stream.next_chunk().await.unwrap(), "event: tick\ndata: 1\n");
        assert!(stream.next_chunk().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_resolves_on_disconnect() {
        let (sink, stream) = EventStream::channel(4);
        let waiter = tokio::spawn(async move { sink.closed().await });
        drop(stream);
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_send_after_disconnect_fails() {
        let (sink, stream) = EventStream::channel(4);
        drop(stream);
        assert!(sink.is_closed());
        assert!(matches!(sink.send("late").await, Err(EventSourceError::Closed)));
    }
}
