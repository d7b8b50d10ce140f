//! Upgrade handshake.
//!
//! The 101 response is built from an immutable header set plus the
//! per-request `Sec-WebSocket-Accept` value; the constant set is never
//! mutated.

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};

use crate::http::request::Request;
use crate::http::response::Response;

/// GUID appended to the client key before hashing.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// The only protocol version accepted.
pub const WEBSOCKET_VERSION: &str = "13";

/// Fixed headers of every 101 Switching Protocols response.
pub const WEBSOCKET_HEADERS: [(HeaderName, &str); 2] = [
    (header::UPGRADE, "websocket"),
    (header::CONNECTION, "Upgrade"),
];

/// `base64(sha1(key + GUID))`.
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.trim().as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Validate the client's handshake.
///
/// Returns the 101 response on success, or the error response to send
/// instead of upgrading.
pub fn respond(request: &Request) -> Result<Response, Response> {
    if let Some(version) = request.header(header::SEC_WEBSOCKET_VERSION) {
        if version.trim() != WEBSOCKET_VERSION {
            return Err(Response::text(StatusCode::UPGRADE_REQUIRED, "Unsupported WebSocket version")
                .with_header(
                    header::SEC_WEBSOCKET_VERSION,
                    HeaderValue::from_static(WEBSOCKET_VERSION),
                ));
        }
    }

    let key = match request.header(header::SEC_WEBSOCKET_KEY) {
        Some(key) if !key.trim().is_empty() => key,
        _ => {
            return Err(Response::text(
                StatusCode::BAD_REQUEST,
                "Missing Sec-WebSocket-Key header",
            ))
        }
    };

    let accept = HeaderValue::from_str(&accept_key(key))
        .map_err(|_| Response::text(StatusCode::BAD_REQUEST, "Invalid Sec-WebSocket-Key header"))?;

    Ok(switching_protocols(accept))
}

fn switching_protocols(accept: HeaderValue) -> Response {
    let mut headers = HeaderMap::with_capacity(WEBSOCKET_HEADERS.len() + 1);
    for (name, value) in WEBSOCKET_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
    headers.insert(header::SEC_WEBSOCKET_ACCEPT, accept);
    Response::new(StatusCode::SWITCHING_PROTOCOLS, headers, bytes::Bytes::new())
}
