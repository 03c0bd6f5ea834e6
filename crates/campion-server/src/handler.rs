//! The query handler seam between transports and resolution.

use async_trait::async_trait;
use campion_proto::{Message, ResponseCode, MAX_TCP_MESSAGE_SIZE, MAX_UDP_MESSAGE_SIZE};
use std::net::SocketAddr;
use std::time::Instant;

use crate::Protocol;

/// Per-request context handed to the handler.
#[derive(Debug, Clone)]
pub struct QueryContext {
    /// Client address.
    pub client: SocketAddr,
    /// Transport the query arrived on.
    pub protocol: Protocol,
    /// When the query was received.
    pub received_at: Instant,
}

impl QueryContext {
    /// Creates a context for a freshly received query.
    pub fn new(client: SocketAddr, protocol: Protocol) -> Self {
        Self {
            client,
            protocol,
            received_at: Instant::now(),
        }
    }

    /// Largest response the transport can carry without truncation.
    pub fn max_response_size(&self) -> usize {
        match self.protocol {
            Protocol::Udp => MAX_UDP_MESSAGE_SIZE,
            Protocol::Tcp => MAX_TCP_MESSAGE_SIZE,
        }
    }
}

/// Resolves one decoded query into a response.
///
/// Implementations must be infallible: errors are expressed as DNS
/// response codes, never as panics or missing responses.
#[async_trait]
pub trait QueryHandler: Send + Sync {
    /// Produces the response for `query`.
    async fn handle(&self, query: Message, context: QueryContext) -> Message;
}

/// A handler that refuses everything. Test support.
pub struct RefusedHandler;

#[async_trait]
impl QueryHandler for RefusedHandler {
    async fn handle(&self, query: Message, _context: QueryContext) -> Message {
        let mut response = Message::response_from(&query);
        response.set_rcode(ResponseCode::Refused);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_response_size() {
        let client: SocketAddr = "127.0.0.1:4242".parse().unwrap();
        assert_eq!(
            QueryContext::new(client, Protocol::Udp).max_response_size(),
            512
        );
        assert_eq!(
            QueryContext::new(client, Protocol::Tcp).max_response_size(),
            65535
        );
    }
}
