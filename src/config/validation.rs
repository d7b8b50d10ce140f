//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (sizes and timeouts > 0, control payload ≤ 125)
//! - Check addresses parse and the log level is known
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServerConfig;
use crate::http::websocket::codec::MAX_CONTROL_PAYLOAD;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem, tagged with the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.http.max_body_size == 0 {
        errors.push(ValidationError::new("http.max_body_size", "must be greater than 0"));
    }
    if config.http.request_timeout_secs == 0 {
        errors.push(ValidationError::new("http.request_timeout_secs", "must be greater than 0"));
    }

    let ws = &config.websocket;
    if ws.max_control_payload == 0 || ws.max_control_payload > MAX_CONTROL_PAYLOAD {
        errors.push(ValidationError::new(
            "websocket.max_control_payload",
            format!("must be between 1 and {MAX_CONTROL_PAYLOAD}"),
        ));
    }
    if ws.max_message_size == 0 {
        errors.push(ValidationError::new("websocket.max_message_size", "must be greater than 0"));
    }
    if ws.close_timeout_ms == 0 {
        errors.push(ValidationError::new("websocket.close_timeout_ms", "must be greater than 0"));
    }

    if config.eventsource.buffer == 0 {
        errors.push(ValidationError::new("eventsource.buffer", "must be greater than 0"));
    }

    let obs = &config.observability;
    if !LOG_LEVELS.contains(&obs.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", obs.log_level),
        ));
    }
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", obs.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
