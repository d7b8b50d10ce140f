//! RFC 6455 frame codec.
//!
//! # Responsibilities
//! - Decode masked client frames from arbitrary byte chunks
//! - Reassemble fragmented text/binary messages
//! - Answer pings and close handshakes on its own
//! - Encode unmasked server frames
//!
//! # Connection States
//! ```text
//! Connecting ──open()──▶ Open ──close()──▶ Closing ──peer close──▶ Closed
//!                          │                                          ▲
//!                          └──── peer close / protocol violation ─────┘
//! ```
//!
//! # Design Decisions
//! - Sans-IO: bytes in, messages and outbound bytes out; the session owns the socket
//! - Header bytes are checked as soon as they arrive, not when the frame is complete
//! - Protocol violations never reach the handler; they close the connection

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::http::websocket::Message;

pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_GOING_AWAY: u16 = 1001;
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;
pub const CLOSE_INVALID_PAYLOAD: u16 = 1007;
pub const CLOSE_TOO_BIG: u16 = 1009;
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

const FIN: u8 = 0x80;
const RSV: u8 = 0x70;
const MASK: u8 = 0x80;

/// Frame opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl OpCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
        }
    }

    pub fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }
}

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Size limits applied while decoding.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_control_payload: usize,
    pub max_message_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_control_payload: MAX_CONTROL_PAYLOAD,
            max_message_size: 16 * 1024 * 1024,
        }
    }
}

/// A client frame that breaks the protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("unsupported opcode {0:#x}")]
    UnsupportedOpcode(u8),
    #[error("reserved bits set")]
    ReservedBits,
    #[error("client frame is not masked")]
    Unmasked,
    #[error("fragmented control frame")]
    FragmentedControl,
    #[error("control frame payload of {0} bytes")]
    ControlTooLarge(u64),
    #[error("message of {0} bytes exceeds the limit")]
    MessageTooBig(u64),
    #[error("text message is not valid UTF-8")]
    InvalidUtf8,
    #[error("continuation frame without a message in progress")]
    UnexpectedContinuation,
    #[error("new data frame while a fragmented message is in progress")]
    InterleavedData,
    #[error("malformed close payload")]
    MalformedClose,
}

impl ProtocolViolation {
    pub fn close_code(&self) -> u16 {
        match self {
            Self::MessageTooBig(_) => CLOSE_TOO_BIG,
            Self::InvalidUtf8 => CLOSE_INVALID_PAYLOAD,
            _ => CLOSE_PROTOCOL_ERROR,
        }
    }

    /// Short label for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::UnsupportedOpcode(_) => "opcode",
            Self::ReservedBits => "rsv",
            Self::Unmasked => "unmasked",
            Self::FragmentedControl => "fragmented_control",
            Self::ControlTooLarge(_) => "control_too_large",
            Self::MessageTooBig(_) => "too_big",
            Self::InvalidUtf8 => "utf8",
            Self::UnexpectedContinuation => "continuation",
            Self::InterleavedData => "interleaved",
            Self::MalformedClose => "close_payload",
        }
    }
}

/// Handler-side send failures.
#[derive(Debug, Error)]
pub enum WebSocketError {
    #[error("connection is closed")]
    Closed,

    #[error("control frame payload of {len} bytes exceeds {max}")]
    ControlFrameTooLarge { len: usize, max: usize },

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

struct Fragments {
    opcode: OpCode,
    payload: BytesMut,
}

struct FrameHeader {
    fin: bool,
    opcode: OpCode,
    header_len: usize,
    payload_len: usize,
    mask: [u8; 4],
}

/// Per-connection codec state.
pub struct FrameCodec {
    state: State,
    limits: Limits,
    inbound: BytesMut,
    outbound: BytesMut,
    fragments: Option<Fragments>,
    close_code: Option<u16>,
    violation: Option<ProtocolViolation>,
}

impl FrameCodec {
    pub fn new(limits: Limits) -> Self {
        Self {
            state: State::Connecting,
            limits,
            inbound: BytesMut::new(),
            outbound: BytesMut::new(),
            fragments: None,
            close_code: None,
            violation: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Close code sent or received, once the close handshake started.
    pub fn close_code(&self) -> Option<u16> {
        self.close_code
    }

    /// The violation that closed the connection, if any.
    pub fn violation(&self) -> Option<&ProtocolViolation> {
        self.violation.as_ref()
    }

    /// The 101 response is committed.
    pub fn open(&mut self) {
        if self.state == State::Connecting {
            self.state = State::Open;
        }
    }

    /// Feed bytes read from the socket; returns every complete message.
    pub fn receive(&mut self, data: &[u8]) -> Vec<Message> {
        let mut messages = Vec::new();
        if matches!(self.state, State::Connecting | State::Closed) {
            return messages;
        }
        self.inbound.extend_from_slice(data);

        while self.state != State::Closed {
            let header = match self.parse_header() {
                Ok(Some(header)) => header,
                Ok(None) => break,
                Err(violation) => {
                    self.fail(violation);
                    break;
                }
            };
            if self.inbound.len() < header.header_len + header.payload_len {
                break;
            }

            self.inbound.advance(header.header_len);
            let mut payload = self.inbound.split_to(header.payload_len);
            for (i, byte) in payload.iter_mut().enumerate() {
                *byte ^= header.mask[i % 4];
            }

            if let Err(violation) = self.handle_frame(header.fin, header.opcode, payload.freeze(), &mut messages) {
                self.fail(violation);
            }
        }
        messages
    }

    /// Queue a message for the peer.
    pub fn send(&mut self, message: &Message) -> Result<(), WebSocketError> {
        if self.state != State::Open {
            return Err(WebSocketError::Closed);
        }
        let (opcode, payload) = message.as_frame();
        if opcode.is_control() && payload.len() > self.limits.max_control_payload {
            return Err(WebSocketError::ControlFrameTooLarge {
                len: payload.len(),
                max: self.limits.max_control_payload,
            });
        }
        encode_frame(opcode, payload, &mut self.outbound);
        Ok(())
    }

    /// Start a server-initiated close.
    pub fn close(&mut self, code: u16) {
        if self.state != State::Open {
            return;
        }
        encode_frame(OpCode::Close, &code.to_be_bytes(), &mut self.outbound);
        self.close_code = Some(code);
        self.state = State::Closing;
    }

    /// Bytes waiting to be written to the socket.
    pub fn take_outbound(&mut self) -> Option<Bytes> {
        if self.outbound.is_empty() {
            None
        } else {
            Some(self.outbound.split().freeze())
        }
    }

    /// Parse the next frame header, validating each byte once it is buffered.
    fn parse_header(&self) -> Result<Option<FrameHeader>, ProtocolViolation> {
        let buf = &self.inbound[..];
        let Some(&b0) = buf.first() else {
            return Ok(None);
        };

        if b0 & RSV != 0 {
            return Err(ProtocolViolation::ReservedBits);
        }
        let opcode = OpCode::from_u8(b0 & 0x0F).ok_or(ProtocolViolation::UnsupportedOpcode(b0 & 0x0F))?;
        let fin = b0 & FIN != 0;
        if opcode.is_control() && !fin {
            return Err(ProtocolViolation::FragmentedControl);
        }
        match (opcode, self.fragments.is_some()) {
            (OpCode::Continuation, false) => return Err(ProtocolViolation::UnexpectedContinuation),
            (OpCode::Text | OpCode::Binary, true) => return Err(ProtocolViolation::InterleavedData),
            _ => {}
        }

        let Some(&b1) = buf.get(1) else {
            return Ok(None);
        };
        if b1 & MASK == 0 {
            return Err(ProtocolViolation::Unmasked);
        }
        let len7 = b1 & 0x7F;
        if opcode.is_control() && len7 as usize > self.limits.max_control_payload {
            return Err(ProtocolViolation::ControlTooLarge(len7 as u64));
        }

        let (payload_len, offset) = match len7 {
            126 => {
                if buf.len() < 4 {
                    return Ok(None);
                }
                (u16::from_be_bytes([buf[2], buf[3]]) as u64, 4)
            }
            127 => {
                if buf.len() < 10 {
                    return Ok(None);
                }
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&buf[2..10]);
                (u64::from_be_bytes(raw), 10)
            }
            n => (n as u64, 2),
        };

        if !opcode.is_control() {
            let pending = self.fragments.as_ref().map_or(0, |f| f.payload.len()) as u64;
            if pending.saturating_add(payload_len) > self.limits.max_message_size as u64 {
                return Err(ProtocolViolation::MessageTooBig(pending.saturating_add(payload_len)));
            }
        }

        if buf.len() < offset + 4 {
            return Ok(None);
        }
        let mut mask = [0u8; 4];
        mask.copy_from_slice(&buf[offset..offset + 4]);

        Ok(Some(FrameHeader {
            fin,
            opcode,
            header_len: offset + 4,
            // Bounded by max_message_size above.
            payload_len: payload_len as usize,
            mask,
        }))
    }

    fn handle_frame(
        &mut self,
        fin: bool,
        opcode: OpCode,
        payload: Bytes,
        messages: &mut Vec<Message>,
    ) -> Result<(), ProtocolViolation> {
        match opcode {
            OpCode::Text | OpCode::Binary => {
                if fin {
                    messages.push(data_message(opcode, payload)?);
                } else {
                    self.fragments = Some(Fragments {
                        opcode,
                        payload: BytesMut::from(&payload[..]),
                    });
                }
            }
            OpCode::Continuation => {
                if let Some(fragments) = self.fragments.as_mut() {
                    fragments.payload.extend_from_slice(&payload);
                }
                if fin {
                    if let Some(done) = self.fragments.take() {
                        messages.push(data_message(done.opcode, done.payload.freeze())?);
                    }
                }
            }
            OpCode::Ping => {
                if self.state == State::Open {
                    encode_frame(OpCode::Pong, &payload, &mut self.outbound);
                }
                messages.push(Message::Ping(payload));
            }
            OpCode::Pong => messages.push(Message::Pong(payload)),
            OpCode::Close => {
                let code = parse_close(&payload)?;
                match self.state {
                    State::Open => {
                        let echoed = code.unwrap_or(CLOSE_NORMAL);
                        encode_frame(OpCode::Close, &echoed.to_be_bytes(), &mut self.outbound);
                        self.close_code = Some(echoed);
                    }
                    _ => {
                        if self.close_code.is_none() {
                            self.close_code = code;
                        }
                    }
                }
                self.state = State::Closed;
                self.inbound.clear();
            }
        }
        Ok(())
    }

    fn fail(&mut self, violation: ProtocolViolation) {
        let code = violation.close_code();
        tracing::debug!(error = %violation, code, "WebSocket protocol violation");
        if self.state == State::Open {
            encode_frame(OpCode::Close, &code.to_be_bytes(), &mut self.outbound);
        }
        self.close_code = Some(code);
        self.violation = Some(violation);
        self.fragments = None;
        self.inbound.clear();
        self.state = State::Closed;
    }
}

fn data_message(opcode: OpCode, payload: Bytes) -> Result<Message, ProtocolViolation> {
    match opcode {
        OpCode::Text => String::from_utf8(payload.to_vec())
            .map(Message::Text)
            .map_err(|_| ProtocolViolation::InvalidUtf8),
        _ => Ok(Message::Binary(payload)),
    }
}

fn parse_close(payload: &[u8]) -> Result<Option<u16>, ProtocolViolation> {
    match payload.len() {
        0 => Ok(None),
        1 => Err(ProtocolViolation::MalformedClose),
        _ => {
            let code = u16::from_be_bytes([payload[0], payload[1]]);
            if !is_valid_close_code(code) {
                return Err(ProtocolViolation::MalformedClose);
            }
            std::str::from_utf8(&payload[2..]).map_err(|_| ProtocolViolation::InvalidUtf8)?;
            Ok(Some(code))
        }
    }
}

fn is_valid_close_code(code: u16) -> bool {
    matches!(code, 1000..=1003 | 1007..=1011 | 3000..=4999)
}

/// Append one unmasked, final frame to `out`.
pub fn encode_frame(opcode: OpCode, payload: &[u8], out: &mut BytesMut) {
    out.reserve(payload.len() + 10);
    out.put_u8(FIN | opcode.as_u8());
    let len = payload.len();
    if len < 126 {
        out.put_u8(len as u8);
    } else if len <= u16::MAX as usize {
        out.put_u8(126);
        out.put_u16(len as u16);
    } else {
        out.put_u8(127);
        out.put_u64(len as u64);
    }
    out.extend_from_slice(payload);
}
