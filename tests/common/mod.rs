//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use switchyard::{Runner, ServerConfig};

/// Client key used by the raw handshakes, and the accept value it produces.
pub const CLIENT_KEY: &str = "sGxYzKDBdoC2s8ZImlNgow==";
pub const EXPECTED_ACCEPT: &str = "zRZMou/76VWlXHo5eoxTMg3tQKQ=";

/// Mask used by the hand-built client frames.
pub const MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Demo configuration bound to an ephemeral port.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.websocket.close_timeout_ms = 200;
    switchyard::demo::configure(&mut config);
    config
}

/// Start the demo application with `config`.
pub async fn start_with(config: ServerConfig) -> (Runner, SocketAddr) {
    let mut runner = Runner::new(config, switchyard::demo::routes()).unwrap();
    let addr = runner.start().await.unwrap();
    (runner, addr)
}

pub async fn start_demo() -> (Runner, SocketAddr) {
    start_with(test_config()).await
}

/// Send a raw upgrade request with the given extra header lines and return
/// the socket plus the response head (status line and headers).
pub async fn raw_upgrade(addr: SocketAddr, path: &str, extra: &str) -> (TcpStream, String) {
    let mut socket = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n{extra}\r\n"
    );
    socket.write_all(request.as_bytes()).await.unwrap();
    let head = read_head(&mut socket).await;
    (socket, head)
}

/// Standard handshake headers for version 13 with [`CLIENT_KEY`].
pub fn handshake_headers() -> String {
    format!("Sec-WebSocket-Version: 13\r\nSec-WebSocket-Key: {CLIENT_KEY}\r\n")
}

/// Open a WebSocket on `path` and assert the 101 handshake.
pub async fn open_websocket(addr: SocketAddr, path: &str) -> TcpStream {
    let (socket, head) = raw_upgrade(addr, path, &handshake_headers()).await;
    assert!(head.starts_with("HTTP/1.1 101 Switching Protocols\r\n"), "unexpected head: {head}");
    assert!(
        header_line(&head, "sec-websocket-accept").as_deref() == Some(EXPECTED_ACCEPT),
        "missing accept header: {head}"
    );
    socket
}

/// Read up to and including the blank line ending an HTTP response head.
pub async fn read_head(socket: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = tokio::time::timeout(IO_TIMEOUT, socket.read(&mut byte))
            .await
            .expect("timed out reading response head")
            .unwrap();
        assert_eq!(n, 1, "connection closed mid-head: {:?}", String::from_utf8_lossy(&head));
        head.push(byte[0]);
    }
    String::from_utf8(head).unwrap()
}

/// Value of header `name` (case-insensitive) in a raw response head.
pub fn header_line(head: &str, name: &str) -> Option<String> {
    head.lines().skip(1).find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim().eq_ignore_ascii_case(name).then(|| value.trim().to_string())
    })
}

pub async fn read_exact(socket: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    tokio::time::timeout(IO_TIMEOUT, socket.read_exact(&mut buf))
        .await
        .expect("timed out reading frame bytes")
        .unwrap();
    buf
}

/// Read until the server closes the socket.
pub async fn read_to_end(socket: &mut TcpStream) -> Vec<u8> {
    let mut buf = Vec::new();
    tokio::time::timeout(IO_TIMEOUT, socket.read_to_end(&mut buf))
        .await
        .expect("timed out waiting for the server to close")
        .unwrap();
    buf
}

/// A single-frame client message, masked with [`MASK`]. Payloads stay under
/// 126 bytes.
pub fn masked_frame(first_byte: u8, payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() < 126);
    let mut frame = vec![first_byte, 0x80 | payload.len() as u8];
    frame.extend_from_slice(&MASK);
    frame.extend(payload.iter().enumerate().map(|(i, b)| b ^ MASK[i % 4]));
    frame
}

/// Server close frame carrying `code`.
pub fn close_frame(code: u16) -> Vec<u8> {
    let [hi, lo] = code.to_be_bytes();
    vec![0x88, 0x02, hi, lo]
}
