//! Long-lived session tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Count open WebSocket and EventSource sessions per kind
//! - Keep the `switchyard_active_sessions` gauge in step
//!
//! # Design Decisions
//! - RAII guard: a session is counted exactly as long as its guard lives
//! - Relaxed ordering for IDs (uniqueness only), SeqCst for counts

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::observability::metrics;

/// Global atomic counter for connection IDs.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a long-lived session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Kind of long-lived session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    WebSocket,
    EventSource,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebSocket => "websocket",
            Self::EventSource => "eventsource",
        }
    }
}

#[derive(Debug, Default)]
struct Counts {
    websocket: AtomicU64,
    eventsource: AtomicU64,
}

impl Counts {
    fn of(&self, kind: SessionKind) -> &AtomicU64 {
        match kind {
            SessionKind::WebSocket => &self.websocket,
            SessionKind::EventSource => &self.eventsource,
        }
    }
}

/// Tracks open sessions.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    counts: Arc<Counts>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new session. The returned guard releases it on drop.
    pub fn track(&self, kind: SessionKind) -> ConnectionGuard {
        let count = self.counts.of(kind).fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_active_sessions(kind.as_str(), count);
        let id = ConnectionId::new();
        tracing::trace!(connection_id = %id, kind = kind.as_str(), "Session opened");
        ConnectionGuard {
            counts: Arc::clone(&self.counts),
            kind,
            id,
        }
    }

    /// Open sessions of one kind.
    pub fn active(&self, kind: SessionKind) -> u64 {
        self.counts.of(kind).load(Ordering::SeqCst)
    }

    /// Open sessions of every kind.
    pub fn active_count(&self) -> u64 {
        self.active(SessionKind::WebSocket) + self.active(SessionKind::EventSource)
    }

    /// Wait until every session is released or `timeout` elapses.
    ///
    /// Returns `true` when all sessions closed in time.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let wait = async {
            while self.active_count() > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

/// Guard that tracks a session's lifetime.
#[derive(Debug)]
pub struct ConnectionGuard {
    counts: Arc<Counts>,
    kind: SessionKind,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let count = self.counts.of(self.kind).fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_active_sessions(self.kind.as_str(), count);
        tracing::trace!(connection_id = %self.id, kind = self.kind.as_str(), "Session closed");
    }
}
