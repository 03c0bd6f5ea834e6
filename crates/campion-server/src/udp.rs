//! UDP listener.

use crate::handler::{QueryContext, QueryHandler};
use crate::{drain_tasks, Protocol, Result, DEFAULT_DRAIN_TIMEOUT};
use bytes::Bytes;
use campion_proto::{peek_id, Message};
use socket2::{Domain, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace};

/// UDP DNS listener.
pub struct UdpServer {
    socket: Arc<UdpSocket>,
    handler: Arc<dyn QueryHandler>,
    local_addr: SocketAddr,
    drain_timeout: Duration,
}

impl UdpServer {
    /// Binds to `addr`.
    pub async fn bind(addr: SocketAddr, handler: Arc<dyn QueryHandler>) -> Result<Self> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, None)?;
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;

        let std_socket: std::net::UdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket)?;
        let local_addr = socket.local_addr()?;

        info!(addr = %local_addr, "udp listener ready");

        Ok(Self {
            socket: Arc::new(socket),
            handler,
            local_addr,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Replaces the shutdown drain bound.
    pub fn set_drain_timeout(&mut self, drain_timeout: Duration) {
        self.drain_timeout = drain_timeout;
    }

    /// Receives datagrams until shutdown is signalled, spawning one
    /// task per query. After the signal, in-flight queries are awaited
    /// up to the drain bound before returning.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let mut buf = vec![0u8; 65535];
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, src)) => {
                        while tasks.try_join_next().is_some() {}
                        let data = Bytes::copy_from_slice(&buf[..len]);
                        let socket = self.socket.clone();
                        let handler = self.handler.clone();

                        tasks.spawn(async move {
                            if let Err(e) = process_query(socket, handler, data, src).await {
                                debug!(error = %e, client = %src, "udp query failed");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "udp receive failed");
                    }
                },
                _ = shutdown.recv() => break,
            }
        }

        drain_tasks(tasks, self.drain_timeout, "udp").await;
        Ok(())
    }
}

async fn process_query(
    socket: Arc<UdpSocket>,
    handler: Arc<dyn QueryHandler>,
    data: Bytes,
    src: SocketAddr,
) -> Result<()> {
    let query = match Message::parse(&data) {
        Ok(message) => message,
        Err(e) => {
            // Unparseable input gets a FORMERR echoing the transaction
            // ID when one is present; shorter garbage is dropped.
            debug!(error = %e, client = %src, "malformed udp query");
            if let Some(id) = peek_id(&data) {
                let formerr = Message::format_error(id);
                socket.send_to(&formerr.to_wire(), src).await?;
            }
            return Ok(());
        }
    };

    trace!(client = %src, id = query.id(), "udp query");

    let ctx = QueryContext::new(src, Protocol::Udp);
    let max_size = ctx.max_response_size();
    let mut response = handler.handle(query, ctx).await;

    let wire = response.to_wire();
    let response_bytes = if wire.len() > max_size {
        response.truncate_to(max_size);
        response.to_wire()
    } else {
        wire
    };

    socket.send_to(&response_bytes, src).await?;
    Ok(())
}
