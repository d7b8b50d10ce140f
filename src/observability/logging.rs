//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global tracing subscriber
//! - Pick the log level (environment first, then config)
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, human-readable format for development
//! - `RUST_LOG` overrides the configured level

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(level: &str) -> String {
    format!("switchyard={level},tower_http={level},warn")
}

/// Install the global subscriber.
///
/// Safe to call more than once; later calls keep the first subscriber.
pub fn init(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(&config.log_level.to_ascii_lowercase())));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if result.is_err() {
        tracing::debug!("Logging already initialized");
    }
}
