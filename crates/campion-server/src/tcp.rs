//! TCP listener with length-prefixed framing.

use crate::handler::{QueryContext, QueryHandler};
use crate::{drain_tasks, Protocol, Result, DEFAULT_DRAIN_TIMEOUT};
use campion_proto::{peek_id, Message, MAX_TCP_MESSAGE_SIZE};
use socket2::{Domain, Socket, Type};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, trace};

static CONNECTION_ID: AtomicU64 = AtomicU64::new(0);

/// TCP DNS listener.
pub struct TcpServer {
    listener: TcpListener,
    handler: Arc<dyn QueryHandler>,
    local_addr: SocketAddr,
    idle_timeout: Duration,
    drain_timeout: Duration,
}

impl TcpServer {
    /// Binds to `addr`.
    pub async fn bind(addr: SocketAddr, handler: Arc<dyn QueryHandler>) -> Result<Self> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        #[cfg(unix)]
        socket.set_reuse_port(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(1024)?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = TcpListener::from_std(std_listener)?;
        let local_addr = listener.local_addr()?;

        info!(addr = %local_addr, "tcp listener ready");

        Ok(Self {
            listener,
            handler,
            local_addr,
            idle_timeout: Duration::from_secs(10),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        })
    }

    /// The bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Replaces the per-connection idle timeout.
    pub fn set_idle_timeout(&mut self, idle_timeout: Duration) {
        self.idle_timeout = idle_timeout;
    }

    /// Replaces the shutdown drain bound.
    pub fn set_drain_timeout(&mut self, drain_timeout: Duration) {
        self.drain_timeout = drain_timeout;
    }

    /// Accepts connections until shutdown is signalled, one task per
    /// connection. After the signal, open connections are awaited up
    /// to the drain bound before returning.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        while tasks.try_join_next().is_some() {}
                        let handler = self.handler.clone();
                        let idle_timeout = self.idle_timeout;
                        let conn_id = CONNECTION_ID.fetch_add(1, Ordering::Relaxed);

                        tasks.spawn(async move {
                            if let Err(e) =
                                handle_connection(stream, peer, handler, idle_timeout, conn_id)
                                    .await
                            {
                                debug!(error = %e, client = %peer, "tcp connection error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "tcp accept failed");
                    }
                },
                _ = shutdown.recv() => break,
            }
        }

        drain_tasks(tasks, self.drain_timeout, "tcp").await;
        Ok(())
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<dyn QueryHandler>,
    idle_timeout: Duration,
    conn_id: u64,
) -> Result<()> {
    trace!(client = %peer, conn_id, "tcp connection opened");

    loop {
        let query_bytes = match timeout(idle_timeout, read_message(&mut stream)).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    trace!(client = %peer, conn_id, "tcp connection closed");
                } else {
                    debug!(error = %e, client = %peer, "tcp read error");
                }
                break;
            }
            Err(_) => {
                trace!(client = %peer, conn_id, "tcp idle timeout");
                break;
            }
        };

        let mut response = match Message::parse(&query_bytes) {
            Ok(query) => {
                let ctx = QueryContext::new(peer, Protocol::Tcp);
                handler.handle(query, ctx).await
            }
            Err(e) => {
                debug!(error = %e, client = %peer, "malformed tcp query");
                match peek_id(&query_bytes) {
                    Some(id) => Message::format_error(id),
                    None => continue,
                }
            }
        };

        // The length prefix is a u16; anything larger must be cut down
        // before framing or the prefix wraps.
        let wire = response.to_wire();
        let response_bytes = if wire.len() > MAX_TCP_MESSAGE_SIZE {
            response.truncate_to(MAX_TCP_MESSAGE_SIZE);
            response.to_wire()
        } else {
            wire
        };

        write_message(&mut stream, &response_bytes).await?;
    }

    Ok(())
}

async fn read_message(stream: &mut TcpStream) -> std::io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await?;
    let len = usize::from(u16::from_be_bytes(len_buf));

    if len == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "zero-length tcp message",
        ));
    }

    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}

async fn write_message(stream: &mut TcpStream, data: &[u8]) -> std::io::Result<()> {
    let len = u16::try_from(data.len()).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "tcp message exceeds length prefix",
        )
    })?;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(data).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::RefusedHandler;
    use async_trait::async_trait;
    use bytes::Bytes;
    use campion_proto::{Class, Name, Question, RData, RecordType, ResourceRecord};

    #[tokio::test]
    async fn test_tcp_bind_ephemeral() {
        let handler = Arc::new(RefusedHandler);
        let server = TcpServer::bind("127.0.0.1:0".parse().unwrap(), handler)
            .await
            .unwrap();
        assert!(server.local_addr().port() > 0);
    }

    // Answers every query with far more TXT data than a u16 length
    // prefix can frame.
    struct HugeHandler;

    #[async_trait]
    impl QueryHandler for HugeHandler {
        async fn handle(&self, query: Message, _context: QueryContext) -> Message {
            let mut response = Message::response_from(&query);
            let name: Name = "big.camp.local".parse().unwrap();
            for _ in 0..300 {
                response.add_answer(ResourceRecord::new(
                    name.clone(),
                    RecordType::TXT,
                    Class::IN,
                    60,
                    RData::Txt(vec![Bytes::from(vec![b'x'; 250])]),
                ));
            }
            response
        }
    }

    #[tokio::test]
    async fn test_oversized_response_truncated_to_prefix_limit() {
        let server = TcpServer::bind("127.0.0.1:0".parse().unwrap(), Arc::new(HugeHandler))
            .await
            .unwrap();
        let addr = server.local_addr();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(async move { server.run(shutdown_rx).await });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let query = Message::query(Question::new(
            "big.camp.local".parse::<Name>().unwrap(),
            RecordType::TXT,
            Class::IN,
        ));
        let wire = query.to_wire();
        stream
            .write_all(&(wire.len() as u16).to_be_bytes())
            .await
            .unwrap();
        stream.write_all(&wire).await.unwrap();

        let mut len_buf = [0u8; 2];
        timeout(Duration::from_secs(5), stream.read_exact(&mut len_buf))
            .await
            .unwrap()
            .unwrap();
        let len = usize::from(u16::from_be_bytes(len_buf));
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await.unwrap();

        let response = Message::parse(&body).unwrap();
        assert_eq!(response.id(), query.id());
        assert!(response.is_truncated());
        assert!(response.answers().len() < 300);
        assert!(!response.answers().is_empty());
    }
}
