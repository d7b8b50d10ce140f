//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files, and
//! every field has a default so a minimal (even empty) file is valid.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Plain HTTP request limits.
    pub http: HttpConfig,

    /// WebSocket session settings.
    pub websocket: WebSocketConfig,

    /// EventSource stream settings.
    pub eventsource: EventSourceConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Limits applied to plain HTTP requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Largest request body buffered before dispatch, in bytes.
    pub max_body_size: usize,

    /// Total time allowed for a plain request, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024,
            request_timeout_secs: 30,
        }
    }
}

/// WebSocket session settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Largest control frame payload accepted (at most 125).
    pub max_control_payload: usize,

    /// Largest (reassembled) data message accepted, in bytes.
    pub max_message_size: usize,

    /// Deliver ping/pong frames to handlers as messages.
    pub forward_control_frames: bool,

    /// How long to wait for the peer's close frame, in milliseconds.
    pub close_timeout_ms: u64,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_control_payload: 125,
            max_message_size: 16 * 1024 * 1024,
            forward_control_frames: false,
            close_timeout_ms: 3000,
        }
    }
}

/// EventSource stream settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventSourceConfig {
    /// Events buffered before `send` waits for the client.
    pub buffer: usize,
}

impl Default for EventSourceConfig {
    fn default() -> Self {
        Self { buffer: 64 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones.
    pub json_logs: bool,

    /// Start the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Address the exporter listens on.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
