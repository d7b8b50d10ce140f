//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route declaration (at startup):
//!     RouteGroup tree (routes, scope middlewares, mounts)
//!     → table.rs (depth-first merge: prefixes + middleware chains)
//!     → pattern.rs (compile every template)
//!     → Freeze as immutable RouteTable
//!
//! Incoming Request (method, path)
//!     → table.rs (linear scan of table[method])
//!     → pattern.rs (match + extract params)
//!     → Return: first matching RouteEntry or NoMatch
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Deterministic: same input always matches same route
//! - First inserted wins, not longest or most specific match
//! - Mounts take child groups by value, so cyclic trees cannot be built

use thiserror::Error;

pub mod group;
pub mod pattern;
pub mod table;

pub use group::{Mount, RouteDecl, RouteGroup};
pub use pattern::{Params, PathPattern};
pub use table::{RouteEntry, RouteTable};

/// Malformed route tree, detected while building the table.
///
/// Always fatal at startup; never produced at request time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Invalid path template '{template}': {reason}")]
    InvalidPattern { template: String, reason: String },

    #[error("Invalid mount prefix '{prefix}': {reason}")]
    InvalidMountPrefix { prefix: String, reason: String },
}

impl ConfigurationError {
    pub(crate) fn invalid_pattern(template: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            template: template.to_string(),
            reason: reason.into(),
        }
    }
}
