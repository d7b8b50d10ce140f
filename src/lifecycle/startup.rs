//! Startup orchestration.
//!
//! # Responsibilities
//! - Freeze the route tree into a table before anything binds
//! - Bind the listener and run the server in the background
//! - Stop it again on request, waiting for the drain to finish
//!
//! # Design Decisions
//! - Fail fast: a bad route tree or bind error is returned, never logged away
//! - `stop` is idempotent and reports whether anything was running

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::{ConfigError, ServerConfig};
use crate::http::server::Server;
use crate::lifecycle::shutdown::Shutdown;
use crate::routing::{ConfigurationError, RouteGroup, RouteTable};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Route configuration error: {0}")]
    Routes(#[from] ConfigurationError),

    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server is already running on {0}")]
    AlreadyRunning(SocketAddr),
}

struct Running {
    addr: SocketAddr,
    shutdown: Shutdown,
    task: JoinHandle<Result<(), std::io::Error>>,
}

/// Owns a server from bind to drain.
pub struct Runner {
    config: ServerConfig,
    table: Arc<RouteTable>,
    running: Option<Running>,
}

impl Runner {
    /// Build the route table; nothing is bound yet.
    pub fn new(config: ServerConfig, routes: RouteGroup) -> Result<Self, StartupError> {
        let table = RouteTable::build(routes)?;
        table.dump_routes();
        Ok(Self {
            config,
            table: Arc::new(table),
            running: None,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.addr)
    }

    /// Bind and start serving. Returns the bound address, which differs
    /// from the configured one when port 0 was requested.
    pub async fn start(&mut self) -> Result<SocketAddr, StartupError> {
        if let Some(running) = &self.running {
            return Err(StartupError::AlreadyRunning(running.addr));
        }

        let address = self.config.listener.bind_address.clone();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| StartupError::Bind { address, source })?;
        let addr = listener.local_addr()?;

        let shutdown = Shutdown::new();
        let server = Server::new(&self.config, Arc::clone(&self.table));
        let task = tokio::spawn(server.serve(listener, shutdown.notified()));

        tracing::info!(address = %addr, "Runner started");
        self.running = Some(Running { addr, shutdown, task });
        Ok(addr)
    }

    /// Stop serving. Returns `false` if the server was not running.
    ///
    /// Once this returns the listener is closed and new connections are refused.
    pub async fn stop(&mut self) -> bool {
        let Some(running) = self.running.take() else {
            return false;
        };

        running.shutdown.trigger();
        match running.task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Server exited with error"),
            Err(e) => tracing::error!(error = %e, "Server task failed"),
        }
        tracing::info!(address = %running.addr, "Runner stopped");
        true
    }

    /// Start, wait for `signal`, then stop.
    pub async fn run_until<F>(mut self, signal: F) -> Result<(), StartupError>
    where
        F: std::future::Future<Output = ()>,
    {
        self.start().await?;
        signal.await;
        self.stop().await;
        Ok(())
    }
}
