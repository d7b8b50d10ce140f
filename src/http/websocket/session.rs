//! Per-connection WebSocket driver.
//!
//! # Responsibilities
//! - Own the upgraded socket and feed it through the codec
//! - Run the handler as its own task inside the sandbox
//! - Relay messages and handler commands over channels
//! - Finish the close handshake on handler exit, peer close, or shutdown
//!
//! # Design Decisions
//! - One task for socket I/O, one for the handler; no shared mutable state
//! - Peer close, protocol violation, or a dead socket aborts the handler
//! - A finished handler gets its queued sends flushed before the close frame

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use crate::config::WebSocketConfig;
use crate::http::clean_room::CleanRoom;
use crate::http::error::HandlerError;
use crate::http::handler::WebSocketHandler;
use crate::http::response::Response;
use crate::http::sandbox::Sandbox;
use crate::http::websocket::codec::{
    FrameCodec, Limits, State, WebSocketError, CLOSE_GOING_AWAY, CLOSE_INTERNAL_ERROR, CLOSE_NORMAL,
};
use crate::http::websocket::Message;
use crate::net::connection::{ConnectionGuard, ConnectionId};
use crate::observability::metrics;

const READ_BUFFER: usize = 8 * 1024;

enum Command {
    Send(Message),
    Close(u16),
}

/// Handler-side view of a WebSocket connection.
pub struct WebSocket {
    id: ConnectionId,
    inbound: mpsc::UnboundedReceiver<Message>,
    commands: mpsc::UnboundedSender<Command>,
    max_control_payload: usize,
}

impl WebSocket {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Next message from the client; `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<Message> {
        self.inbound.recv().await
    }

    pub fn send(&self, message: impl Into<Message>) -> Result<(), WebSocketError> {
        let message = message.into();
        if let Message::Ping(payload) | Message::Pong(payload) = &message {
            if payload.len() > self.max_control_payload {
                return Err(WebSocketError::ControlFrameTooLarge {
                    len: payload.len(),
                    max: self.max_control_payload,
                });
            }
        }
        self.commands
            .send(Command::Send(message))
            .map_err(|_| WebSocketError::Closed)
    }

    pub fn send_text(&self, text: impl Into<String>) -> Result<(), WebSocketError> {
        self.send(Message::Text(text.into()))
    }

    pub fn send_binary(&self, data: impl Into<Bytes>) -> Result<(), WebSocketError> {
        self.send(Message::Binary(data.into()))
    }

    pub fn ping(&self, payload: impl Into<Bytes>) -> Result<(), WebSocketError> {
        self.send(Message::Ping(payload.into()))
    }

    /// Start the close handshake with `code`.
    pub fn close(&self, code: u16) -> Result<(), WebSocketError> {
        self.commands
            .send(Command::Close(code))
            .map_err(|_| WebSocketError::Closed)
    }
}

/// A session waiting for the transport to hand over the upgraded stream.
pub struct WebSocketSession {
    room: CleanRoom,
    handler: Arc<dyn WebSocketHandler>,
    config: WebSocketConfig,
    shutdown: broadcast::Receiver<()>,
    guard: ConnectionGuard,
}

/// The 101 response plus the session to run once the upgrade completes.
pub struct WebSocketUpgrade {
    pub response: Response,
    pub session: WebSocketSession,
}

impl WebSocketSession {
    pub fn new(
        room: CleanRoom,
        handler: Arc<dyn WebSocketHandler>,
        config: WebSocketConfig,
        shutdown: broadcast::Receiver<()>,
        guard: ConnectionGuard,
    ) -> Self {
        Self {
            room,
            handler,
            config,
            shutdown,
            guard,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.guard.id()
    }

    /// Drive the connection until it is closed.
    pub async fn run<S>(self, io: S)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let Self {
            room,
            handler,
            config,
            mut shutdown,
            guard,
        } = self;
        let id = guard.id();
        let path = room.request().path.clone();

        let (mut reader, mut writer) = tokio::io::split(io);
        let mut codec = FrameCodec::new(Limits {
            max_control_payload: config.max_control_payload,
            max_message_size: config.max_message_size,
        });
        codec.open();

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (command_tx, mut command_rx) = mpsc::unbounded_channel();
        let socket = WebSocket {
            id,
            inbound: inbound_rx,
            commands: command_tx,
            max_control_payload: config.max_control_payload,
        };
        let mut task = tokio::spawn(async move { Sandbox::run_async(handler.call(room, socket)).await });

        tracing::info!(connection_id = %id, path = %path, "WebSocket session opened");

        let close_timeout = Duration::from_millis(config.close_timeout_ms);
        let deadline = tokio::time::sleep(Duration::from_secs(24 * 60 * 60));
        tokio::pin!(deadline);
        let mut closing = false;
        let mut handler_done = false;
        let mut shutting_down = false;
        let mut buf = vec![0u8; READ_BUFFER];

        loop {
            let was_open = codec.state() == State::Open;

            tokio::select! {
                read = reader.read(&mut buf) => match read {
                    Ok(0) => {
                        tracing::debug!(connection_id = %id, "Peer closed the socket");
                        break;
                    }
                    Ok(n) => {
                        for message in codec.receive(&buf[..n]) {
                            if message.is_control() && !config.forward_control_frames {
                                continue;
                            }
                            let _ = inbound_tx.send(message);
                        }
                    }
                    Err(error) => {
                        tracing::debug!(connection_id = %id, error = %error, "WebSocket read failed");
                        break;
                    }
                },
                Some(command) = command_rx.recv(), if !handler_done => {
                    apply(&mut codec, command, id);
                }
                result = &mut task, if !handler_done => {
                    handler_done = true;
                    while let Ok(command) = command_rx.try_recv() {
                        apply(&mut codec, command, id);
                    }
                    let code = match result {
                        Ok(Ok(())) => CLOSE_NORMAL,
                        Ok(Err(error)) => {
                            report_failure(id, &error);
                            CLOSE_INTERNAL_ERROR
                        }
                        Err(error) => {
                            tracing::error!(connection_id = %id, error = %error, "WebSocket handler task failed");
                            metrics::record_handler_failure("websocket");
                            CLOSE_INTERNAL_ERROR
                        }
                    };
                    codec.close(code);
                }
                Ok(()) = shutdown.recv(), if !shutting_down => {
                    shutting_down = true;
                    codec.close(CLOSE_GOING_AWAY);
                }
                _ = &mut deadline, if closing => {
                    tracing::debug!(connection_id = %id, "Close handshake timed out");
                    break;
                }
            }

            if was_open && codec.state() == State::Closing && !closing {
                closing = true;
                deadline.as_mut().reset(Instant::now() + close_timeout);
            }

            if let Some(bytes) = codec.take_outbound() {
                if let Err(error) = write_all(&mut writer, &bytes).await {
                    tracing::debug!(connection_id = %id, error = %error, "WebSocket write failed");
                    break;
                }
            }

            if codec.state() == State::Closed {
                break;
            }
        }

        if !task.is_finished() {
            task.abort();
        }
        let _ = writer.shutdown().await;

        if let Some(violation) = codec.violation() {
            metrics::record_protocol_violation(violation.reason());
        }
        tracing::info!(
            connection_id = %id,
            path = %path,
            code = codec.close_code(),
            "WebSocket session closed"
        );
        drop(guard);
    }
}

fn apply(codec: &mut FrameCodec, command: Command, id: ConnectionId) {
    match command {
        Command::Send(message) => {
            if let Err(error) = codec.send(&message) {
                tracing::debug!(connection_id = %id, error = %error, "Dropped outbound message");
            }
        }
        Command::Close(code) => codec.close(code),
    }
}

fn report_failure(id: ConnectionId, error: &HandlerError) {
    tracing::error!(connection_id = %id, error = %error, "WebSocket handler failed");
    metrics::record_handler_failure("websocket");
}

async fn write_all<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Request;
    use crate::lifecycle::Shutdown;
    use crate::net::connection::{ConnectionTracker, SessionKind};
    use axum::http::Method;
    use tokio::io::DuplexStream;

    const KEY: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

    fn masked(first: u8, payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![first, 0x80 | payload.len() as u8];
        frame.extend_from_slice(&KEY);
        frame.extend(payload.iter().enumerate().map(|(i, b)| b ^ KEY[i % 4]));
        frame
    }

    async fn echo(_room: CleanRoom, mut socket: WebSocket) -> Result<(), HandlerError> {
        socket.send_text("Hello")?;
        while let Some(message) = socket.recv().await {
            match message {
                Message::Text(text) => socket.send_text(text)?,
                Message::Binary(data) => socket.send_binary(data)?,
                Message::Pong(_) => socket.send_text("")?,
                Message::Ping(_) => {}
            }
        }
        Ok(())
    }

    async fn say_bye(_room: CleanRoom, socket: WebSocket) -> Result<(), HandlerError> {
        socket.send_text("bye")?;
        Ok(())
    }

    async fn explode(_room: CleanRoom, socket: WebSocket) -> Result<(), HandlerError> {
        socket.send_text("Hello")?;
        panic!("websocket handler blew up")
    }

    fn start<H: WebSocketHandler + 'static>(
        handler: H,
        config: WebSocketConfig,
    ) -> (DuplexStream, Shutdown, ConnectionTracker, tokio::task::JoinHandle<()>) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let shutdown = Shutdown::new();
        let tracker = ConnectionTracker::new();
        let session = WebSocketSession::new(
            CleanRoom::new(Request::new(Method::GET, "/websocket")),
            Arc::new(handler),
            config,
            shutdown.subscribe(),
            tracker.track(SessionKind::WebSocket),
        );
        let task = tokio::spawn(session.run(server));
        (client, shutdown, tracker, task)
    }

    async fn read_exact(client: &mut DuplexStream, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        client.read_exact(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn test_greeting_and_echo() {
        let (mut client, _shutdown, _tracker, _task) = start(echo, WebSocketConfig::default());
        assert_eq!(read_exact(&mut client, 7).await, b"\x81\x05Hello");

        client.write_all(&masked(0x81, b"Hello")).await.unwrap();
        assert_eq!(read_exact(&mut client, 7).await, b"\x81\x05Hello");

        client.write_all(&masked(0x82, &[1, 2, 3])).await.unwrap();
        assert_eq!(read_exact(&mut client, 5).await, &[0x82, 0x03, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_ping_gets_pong_and_pong_is_silent() {
        let (mut client, _shutdown, _tracker, _task) = start(echo, WebSocketConfig::default());
        read_exact(&mut client, 7).await;

        client.write_all(&masked(0x8a, b"Hello")).await.unwrap();
        client.write_all(&masked(0x89, b"Hello")).await.unwrap();
        assert_eq!(read_exact(&mut client, 7).await, b"\x8a\x05Hello");
    }

    #[tokio::test]
    async fn test_forwarded_pong_reaches_handler() {
        let config = WebSocketConfig {
            forward_control_frames: true,
            ..WebSocketConfig::default()
        };
        let (mut client, _shutdown, _tracker, _task) = start(echo, config);
        read_exact(&mut client, 7).await;

        client.write_all(&masked(0x8a, b"")).await.unwrap();
        assert_eq!(read_exact(&mut client, 2).await, &[0x81, 0x00]);
    }

    #[tokio::test]
    async fn test_peer_close_ends_session() {
        let (mut client, _shutdown, tracker, task) = start(echo, WebSocketConfig::default());
        read_exact(&mut client, 7).await;

        client.write_all(&masked(0x88, &1000u16.to_be_bytes())).await.unwrap();
        assert_eq!(read_exact(&mut client, 4).await, &[0x88, 0x02, 0x03, 0xe8]);
        task.await.unwrap();
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn test_protocol_violation_closes() {
        let (mut client, _shutdown, _tracker, task) = start(echo, WebSocketConfig::default());
        read_exact(&mut client, 7).await;

        client.write_all(&[0x48]).await.unwrap();
        let close = read_exact(&mut client, 4).await;
        assert_eq!(close[0], 0x88);
        assert_eq!(&close[2..4], &1002u16.to_be_bytes());
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_handler_exit_flushes_then_closes() {
        let (mut client, _shutdown, _tracker, task) = start(say_bye, WebSocketConfig::default());
        assert_eq!(read_exact(&mut client, 5).await, b"\x81\x03bye");
        assert_eq!(read_exact(&mut client, 4).await, &[0x88, 0x02, 0x03, 0xe8]);

        client.write_all(&masked(0x88, &1000u16.to_be_bytes())).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_panicking_handler_closes_with_internal_error() {
        let (mut client, _shutdown, tracker, task) = start(explode, WebSocketConfig::default());
        assert_eq!(read_exact(&mut client, 7).await, b"\x81\x05Hello");
        assert_eq!(read_exact(&mut client, 4).await, &[0x88, 0x02, 0x03, 0xf3]);

        client.write_all(&masked(0x88, &1011u16.to_be_bytes())).await.unwrap();
        task.await.unwrap();
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_sends_going_away() {
        let (mut client, shutdown, _tracker, _task) = start(echo, WebSocketConfig::default());
        read_exact(&mut client, 7).await;

        shutdown.trigger();
        assert_eq!(read_exact(&mut client, 4).await, &[0x88, 0x02, 0x03, 0xe9]);
    }
}
