//! Demo application served by the `switchyard` binary.
//!
//! # Routes
//! ```text
//! GET /                          → "Hello World"
//! GET /error                     → handler panics → 500
//! GET /test_error                → 500 "Hello Error"
//! GET /hello/:name               → {"hello": name} as JSON
//! POST /echo                     → request body echoed as text
//! GET /websocket                 → "Hello" on open, echoes text and binary,
//!                                  answers a pong with an empty text frame
//! GET /websocket/ping            → sends an empty ping on open
//! GET /websocket/too_large_ping  → tries a 126-byte ping, fails the handler
//! GET /websocket/wrong_opcode    → echo endpoint for protocol-violation tests
//! GET /eventsource               → "Hello", "World"
//! ```

use axum::http::StatusCode;
use serde_json::json;

use crate::config::ServerConfig;
use crate::http::eventsource::EventSink;
use crate::http::websocket::codec::MAX_CONTROL_PAYLOAD;
use crate::http::websocket::{Message, WebSocket};
use crate::http::{CleanRoom, HandlerError, Response};
use crate::routing::RouteGroup;

/// The demo route tree.
pub fn routes() -> RouteGroup {
    let mut sockets = RouteGroup::new();
    sockets.websocket("", echo);
    sockets.websocket("/ping", ping_on_open);
    sockets.websocket("/too_large_ping", too_large_ping);
    sockets.websocket("/wrong_opcode", echo);

    let mut root = RouteGroup::new();
    root.get("/", hello);
    root.get("/error", explode);
    root.get("/test_error", test_error);
    root.get("/hello/:name", greet);
    root.post("/echo", echo_body);
    root.eventsource("/eventsource", hello_world_events);
    root.mount("/websocket", sockets);
    root
}

/// Settings the demo depends on: the echo socket answers pongs.
pub fn configure(config: &mut ServerConfig) {
    config.websocket.forward_control_frames = true;
}

fn hello(_room: &mut CleanRoom) -> &'static str {
    "Hello World"
}

fn explode(_room: &mut CleanRoom) -> &'static str {
    panic!("demo failure")
}

fn test_error(_room: &mut CleanRoom) -> Result<&'static str, HandlerError> {
    Err(HandlerError::status(StatusCode::INTERNAL_SERVER_ERROR, "Hello Error"))
}

fn greet(room: &mut CleanRoom) -> Response {
    let name = room.param("name").unwrap_or_default();
    Response::json(StatusCode::OK, &json!({ "hello": name }))
}

fn echo_body(room: &mut CleanRoom) -> String {
    room.request().text()
}

async fn echo(_room: CleanRoom, mut socket: WebSocket) -> Result<(), HandlerError> {
    socket.send_text("Hello")?;
    while let Some(message) = socket.recv().await {
        match message {
            Message::Text(_) | Message::Binary(_) => socket.send(message)?,
            Message::Pong(_) => socket.send_text("")?,
            Message::Ping(_) => {}
        }
    }
    Ok(())
}

async fn ping_on_open(_room: CleanRoom, mut socket: WebSocket) -> Result<(), HandlerError> {
    socket.ping(Vec::new())?;
    while socket.recv().await.is_some() {}
    Ok(())
}

async fn too_large_ping(_room: CleanRoom, socket: WebSocket) -> Result<(), HandlerError> {
    socket.ping(vec![0u8; MAX_CONTROL_PAYLOAD + 1])?;
    Ok(())
}

async fn hello_world_events(_room: CleanRoom, sink: EventSink) -> Result<(), HandlerError> {
    sink.send("Hello").await?;
    sink.send("World").await?;
    Ok(())
}
