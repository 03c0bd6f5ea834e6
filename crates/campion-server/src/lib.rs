//! DNS transport listeners.
//!
//! Binds the UDP (and optionally TCP) sockets, dispatches each
//! received query to the [`handler::QueryHandler`] in its own task,
//! and writes back the response. Queries that fail to decode are
//! answered with FORMERR; nothing a client sends can take a listener
//! down. Shutdown is cooperative through a broadcast channel.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod handler;
pub mod tcp;
pub mod udp;

pub use handler::{QueryContext, QueryHandler};
pub use tcp::TcpServer;
pub use udp::UdpServer;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Default bound on waiting for in-flight requests after shutdown.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Listener errors. Bind failures are fatal at startup; everything
/// after that is per-connection and logged.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Socket-level failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid listener configuration.
    #[error("server configuration error: {0}")]
    Config(String),
}

/// Result alias for listener operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Transport a query arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Plain UDP.
    Udp,
    /// Plain TCP.
    Tcp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Udp => f.write_str("udp"),
            Self::Tcp => f.write_str("tcp"),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// UDP listen address.
    pub udp: SocketAddr,
    /// TCP listen address, when TCP is enabled.
    pub tcp: Option<SocketAddr>,
    /// Bound on waiting for in-flight requests after shutdown.
    pub drain_timeout: Duration,
}

/// Awaits spawned request tasks up to `limit`, then aborts whatever is
/// left.
pub(crate) async fn drain_tasks(mut tasks: JoinSet<()>, limit: Duration, listener: &str) {
    if tasks.is_empty() {
        return;
    }
    debug!(listener, in_flight = tasks.len(), "draining requests");
    let drained = tokio::time::timeout(limit, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(listener, remaining = tasks.len(), "drain timed out, aborting");
        tasks.shutdown().await;
    }
}

/// The assembled DNS server: one UDP listener, an optional TCP
/// listener, and a shared handler.
pub struct DnsServer {
    config: ServerConfig,
    handler: Arc<dyn QueryHandler>,
    shutdown_tx: broadcast::Sender<()>,
}

impl DnsServer {
    /// Creates a server; nothing is bound until [`DnsServer::run`].
    pub fn new(config: ServerConfig, handler: Arc<dyn QueryHandler>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            handler,
            shutdown_tx,
        }
    }

    /// A handle that triggers shutdown when signalled.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Binds all listeners and serves until shutdown is signalled.
    ///
    /// Bind failures surface immediately; afterwards each listener
    /// runs until the shutdown broadcast fires, stops accepting, and
    /// awaits its in-flight requests up to the configured drain bound
    /// before this returns.
    pub async fn run(&self) -> Result<()> {
        let mut udp = UdpServer::bind(self.config.udp, self.handler.clone()).await?;
        udp.set_drain_timeout(self.config.drain_timeout);
        let udp_addr = udp.local_addr();

        let tcp = match self.config.tcp {
            Some(addr) => {
                let mut tcp = TcpServer::bind(addr, self.handler.clone()).await?;
                tcp.set_drain_timeout(self.config.drain_timeout);
                Some(tcp)
            }
            None => None,
        };

        let mut tasks = Vec::new();

        let shutdown_rx = self.shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move { udp.run(shutdown_rx).await }));

        if let Some(tcp) = tcp {
            let shutdown_rx = self.shutdown_tx.subscribe();
            tasks.push(tokio::spawn(async move { tcp.run(shutdown_rx).await }));
        }

        info!(udp = %udp_addr, tcp = self.config.tcp.is_some(), "server running");

        for task in tasks {
            match task.await {
                Ok(result) => result?,
                Err(e) => return Err(ServerError::Config(format!("listener task failed: {e}"))),
            }
        }

        Ok(())
    }

    /// Signals all listeners to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handler::RefusedHandler;
    use std::time::Duration;

    #[tokio::test]
    async fn test_server_runs_and_shuts_down() {
        let server = DnsServer::new(
            ServerConfig {
                udp: "127.0.0.1:0".parse().unwrap(),
                tcp: None,
                drain_timeout: Duration::from_secs(1),
            },
            Arc::new(RefusedHandler),
        );
        let shutdown = server.shutdown_handle();

        let run = tokio::spawn(async move { server.run().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = shutdown.send(());

        let result = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }
}
