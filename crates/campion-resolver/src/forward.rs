//! The forwarding engine.

use crate::{ForwardConfig, ForwardError, Result};
use campion_cache::{CacheKey, ForwardCache};
use campion_proto::{Message, Question, ResourceRecord, ResponseCode};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

/// An answer obtained by forwarding, from cache or upstream.
#[derive(Debug, Clone)]
pub struct ForwardAnswer {
    /// Response code from upstream (or the cached one).
    pub rcode: ResponseCode,
    /// Answer records.
    pub answers: Vec<ResourceRecord>,
    /// Authority records; empty for cached answers.
    pub authorities: Vec<ResourceRecord>,
    /// True when served from cache without a network call.
    pub cached: bool,
}

/// Forwards questions to the configured upstream, cache-first.
pub struct Forwarder {
    config: ForwardConfig,
    cache: Arc<ForwardCache>,
}

impl Forwarder {
    /// Creates a forwarder sharing the given cache.
    pub fn new(config: ForwardConfig, cache: Arc<ForwardCache>) -> Self {
        Self { config, cache }
    }

    /// The configured upstream address.
    pub fn upstream(&self) -> std::net::SocketAddr {
        self.config.upstream
    }

    /// Resolves a question, consulting the cache before the network.
    ///
    /// Cache entries are keyed by (name, type, class); an unexpired
    /// hit is returned with age-adjusted TTLs and no upstream call.
    pub async fn forward(&self, question: &Question) -> Result<ForwardAnswer> {
        let key = CacheKey::from_question(question);

        if let Some(entry) = self.cache.lookup(&key) {
            return Ok(ForwardAnswer {
                rcode: entry.rcode(),
                answers: entry.records_with_adjusted_ttl(Instant::now()),
                authorities: Vec::new(),
                cached: true,
            });
        }

        let response = self.query_upstream(question).await?;

        if response.rcode() == ResponseCode::Refused {
            return Err(ForwardError::Refused {
                upstream: self.config.upstream,
            });
        }

        self.cache
            .store(key, response.answers().to_vec(), response.rcode());

        Ok(ForwardAnswer {
            rcode: response.rcode(),
            answers: response.answers().to_vec(),
            authorities: response.authorities().to_vec(),
            cached: false,
        })
    }

    /// Queries the upstream over UDP with retries, each attempt under
    /// its own fresh transaction ID. Responses whose ID does not match
    /// the one sent are discarded as spoofed. Truncated responses are
    /// retried over TCP.
    async fn query_upstream(&self, question: &Question) -> Result<Message> {
        let attempts = self.config.retries + 1;
        let mut last_error = ForwardError::Timeout {
            upstream: self.config.upstream,
            attempts,
        };

        for attempt in 0..attempts {
            let query = Message::query(question.clone());

            match self.query_udp(&query).await {
                Ok(response) if response.is_truncated() => {
                    debug!(upstream = %self.config.upstream, "truncated reply, retrying over tcp");
                    match self.query_tcp(&query).await {
                        Ok(full) => return Ok(full),
                        Err(error) => last_error = error,
                    }
                }
                Ok(response) => return Ok(response),
                Err(error) => {
                    trace!(
                        upstream = %self.config.upstream,
                        attempt,
                        error = %error,
                        "upstream attempt failed"
                    );
                    last_error = error;
                }
            }
        }

        warn!(upstream = %self.config.upstream, error = %last_error, "forwarding failed");
        Err(match last_error {
            // Report the full attempt count on timeout.
            ForwardError::Timeout { upstream, .. } => ForwardError::Timeout { upstream, attempts },
            other => other,
        })
    }

    async fn query_udp(&self, query: &Message) -> Result<Message> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(self.config.upstream).await?;
        socket.send(&query.to_wire()).await?;

        let mut buf = vec![0u8; 4096];
        let len = timeout(self.config.timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| ForwardError::Timeout {
                upstream: self.config.upstream,
                attempts: 1,
            })??;

        let response = Message::parse(&buf[..len])
            .map_err(|e| ForwardError::Protocol(format!("unparseable response: {e}")))?;
        self.check_response(query, &response)?;
        Ok(response)
    }

    async fn query_tcp(&self, query: &Message) -> Result<Message> {
        let connect = TcpStream::connect(self.config.upstream);
        let mut stream = timeout(self.config.timeout, connect)
            .await
            .map_err(|_| ForwardError::Timeout {
                upstream: self.config.upstream,
                attempts: 1,
            })??;

        let wire = query.to_wire();
        stream.write_all(&(wire.len() as u16).to_be_bytes()).await?;
        stream.write_all(&wire).await?;

        let exchange = async {
            let mut len_buf = [0u8; 2];
            stream.read_exact(&mut len_buf).await?;
            let len = usize::from(u16::from_be_bytes(len_buf));
            let mut body = vec![0u8; len];
            stream.read_exact(&mut body).await?;
            Ok::<Vec<u8>, std::io::Error>(body)
        };
        let body = timeout(self.config.timeout, exchange)
            .await
            .map_err(|_| ForwardError::Timeout {
                upstream: self.config.upstream,
                attempts: 1,
            })??;

        let response = Message::parse(&body)
            .map_err(|e| ForwardError::Protocol(format!("unparseable tcp response: {e}")))?;
        self.check_response(query, &response)?;
        Ok(response)
    }

    fn check_response(&self, query: &Message, response: &Message) -> Result<()> {
        if response.id() != query.id() {
            return Err(ForwardError::Protocol(format!(
                "transaction id mismatch: sent {:04x}, got {:04x}",
                query.id(),
                response.id()
            )));
        }
        if !response.is_response() {
            return Err(ForwardError::Protocol("QR bit not set".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campion_cache::CacheConfig;
    use campion_proto::{Name, ResourceRecord};
    use std::net::{Ipv4Addr, SocketAddr};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    fn test_config(upstream: SocketAddr) -> ForwardConfig {
        ForwardConfig {
            upstream,
            timeout: Duration::from_millis(250),
            retries: 1,
        }
    }

    fn forwarder(upstream: SocketAddr) -> Forwarder {
        Forwarder::new(
            test_config(upstream),
            Arc::new(ForwardCache::new(CacheConfig::default())),
        )
    }

    /// Starts a fake upstream that answers every A query with one
    /// record and counts the queries it saw.
    async fn fake_upstream(hits: Arc<AtomicU64>) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = vec![0u8; 512];
            loop {
                let (len, src) = socket.recv_from(&mut buf).await.unwrap();
                hits.fetch_add(1, Ordering::Relaxed);

                let query = Message::parse(&buf[..len]).unwrap();
                let mut response = Message::response_from(&query);
                let qname = query.question().unwrap().qname.clone();
                response.add_answer(ResourceRecord::a(
                    qname,
                    Ipv4Addr::new(192, 0, 2, 7),
                    120,
                ));
                socket.send_to(&response.to_wire(), src).await.unwrap();
            }
        });

        addr
    }

    fn question(name: &str) -> Question {
        Question::a(name.parse::<Name>().unwrap())
    }

    #[tokio::test]
    async fn test_forward_and_cache() {
        let hits = Arc::new(AtomicU64::new(0));
        let upstream = fake_upstream(hits.clone()).await;
        let forwarder = forwarder(upstream);

        let first = forwarder.forward(&question("host.example.com")).await.unwrap();
        assert!(!first.cached);
        assert_eq!(first.answers.len(), 1);
        assert_eq!(first.rcode, ResponseCode::NoError);

        let second = forwarder.forward(&question("host.example.com")).await.unwrap();
        assert!(second.cached);
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_timeout_when_upstream_silent() {
        // Bind a socket that never answers.
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let forwarder = forwarder(silent.local_addr().unwrap());

        let err = forwarder
            .forward(&question("host.example.com"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ForwardError::Timeout { attempts: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_mismatched_id_rejected() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let upstream = socket.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = vec![0u8; 512];
            loop {
                let (len, src) = socket.recv_from(&mut buf).await.unwrap();
                let query = Message::parse(&buf[..len]).unwrap();
                let mut response = Message::response_from(&query);
                response.set_id(query.id().wrapping_add(1));
                socket.send_to(&response.to_wire(), src).await.unwrap();
            }
        });

        let err = forwarder(upstream)
            .forward(&question("host.example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_refused_surfaces_as_error() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let upstream = socket.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = vec![0u8; 512];
            loop {
                let (len, src) = socket.recv_from(&mut buf).await.unwrap();
                let query = Message::parse(&buf[..len]).unwrap();
                let mut response = Message::response_from(&query);
                response.set_rcode(ResponseCode::Refused);
                socket.send_to(&response.to_wire(), src).await.unwrap();
            }
        });

        let err = forwarder(upstream)
            .forward(&question("host.example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::Refused { .. }));
    }

    #[tokio::test]
    async fn test_truncated_reply_retried_over_tcp() {
        let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let upstream = udp.local_addr().unwrap();
        let tcp = tokio::net::TcpListener::bind(upstream).await.unwrap();

        // UDP half: answer everything with TC set and no records.
        tokio::spawn(async move {
            let mut buf = vec![0u8; 512];
            loop {
                let (len, src) = udp.recv_from(&mut buf).await.unwrap();
                let query = Message::parse(&buf[..len]).unwrap();
                let response = Message::response_from(&query);
                // Set TC directly in the serialized header.
                let mut wire = response.to_wire();
                wire[2] |= 0x02;
                udp.send_to(&wire, src).await.unwrap();
            }
        });

        // TCP half: serve the full answer.
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = tcp.accept().await.unwrap();
                let mut len_buf = [0u8; 2];
                stream.read_exact(&mut len_buf).await.unwrap();
                let mut body = vec![0u8; usize::from(u16::from_be_bytes(len_buf))];
                stream.read_exact(&mut body).await.unwrap();

                let query = Message::parse(&body).unwrap();
                let mut response = Message::response_from(&query);
                response.add_answer(ResourceRecord::a(
                    query.question().unwrap().qname.clone(),
                    Ipv4Addr::new(192, 0, 2, 9),
                    60,
                ));
                let wire = response.to_wire();
                stream
                    .write_all(&(wire.len() as u16).to_be_bytes())
                    .await
                    .unwrap();
                stream.write_all(&wire).await.unwrap();
            }
        });

        let answer = forwarder(upstream)
            .forward(&question("big.example.com"))
            .await
            .unwrap();
        assert!(!answer.cached);
        assert_eq!(answer.answers.len(), 1);
        assert_eq!(
            answer.answers[0].rdata.as_a(),
            Some(Ipv4Addr::new(192, 0, 2, 9))
        );
    }

    #[test]
    fn test_fresh_transaction_ids() {
        // Message::query picks a random ID per construction; two
        // consecutive queries for the same question must not share one
        // in general. Collisions are possible but vanishing for a
        // handful of draws.
        let q = question("host.example.com");
        let ids: std::collections::HashSet<u16> =
            (0..8).map(|_| Message::query(q.clone()).id()).collect();
        assert!(ids.len() > 1);
    }
}
