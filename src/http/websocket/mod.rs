//! WebSocket support.
//!
//! # Data Flow
//! ```text
//! Upgrade request
//!     → handshake.rs (validate key/version, build 101 response)
//!     → transport upgrades the connection
//!     → session.rs (socket I/O loop, one per connection)
//!         ↔ codec.rs (frame decode/encode, control frames, close handshake)
//!         ↔ handler task (WebSocket handle: recv / send / close)
//! ```
//!
//! # Design Decisions
//! - The codec never touches I/O; the session owns the socket
//! - Handlers talk to the session over channels, never to the socket
//! - Ping/pong and close handshakes are answered by the codec itself

use bytes::Bytes;

pub mod codec;
pub mod handshake;
pub mod session;

pub use codec::{FrameCodec, Limits, OpCode, ProtocolViolation, State, WebSocketError};
pub use handshake::{accept_key, WEBSOCKET_GUID, WEBSOCKET_HEADERS};
pub use session::{WebSocket, WebSocketSession, WebSocketUpgrade};

/// A complete WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
}

impl Message {
    /// Opcode and payload this message is framed with.
    pub fn as_frame(&self) -> (OpCode, &[u8]) {
        match self {
            Self::Text(text) => (OpCode::Text, text.as_bytes()),
            Self::Binary(data) => (OpCode::Binary, &data[..]),
            Self::Ping(data) => (OpCode::Ping, &data[..]),
            Self::Pong(data) => (OpCode::Pong, &data[..]),
        }
    }

    pub fn is_control(&self) -> bool {
        matches!(self, Self::Ping(_) | Self::Pong(_))
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Bytes> for Message {
    fn from(data: Bytes) -> Self {
        Self::Binary(data)
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(data))
    }
}
