//! Forwarding of non-authoritative queries to an upstream resolver.
//!
//! The [`Forwarder`] answers from its cache when it can and otherwise
//! queries the configured upstream over UDP, retrying with fresh
//! transaction IDs and falling back to TCP on truncation.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod forward;

pub use forward::{ForwardAnswer, Forwarder};

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors from a forwarding attempt. The handler maps
/// [`ForwardError::Refused`] to REFUSED and everything else to
/// SERVFAIL; none of them terminate the server.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// No attempt produced a response in time.
    #[error("upstream {upstream} timed out after {attempts} attempts")]
    Timeout {
        /// The upstream that was queried.
        upstream: SocketAddr,
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// The upstream refused the query.
    #[error("upstream {upstream} refused the query")]
    Refused {
        /// The upstream that refused.
        upstream: SocketAddr,
    },

    /// A socket-level failure.
    #[error("network error talking to upstream: {0}")]
    Network(#[from] std::io::Error),

    /// The upstream sent something unusable.
    #[error("protocol error from upstream: {0}")]
    Protocol(String),
}

/// Result alias for forwarding operations.
pub type Result<T> = std::result::Result<T, ForwardError>;

/// Forwarder tuning.
#[derive(Debug, Clone)]
pub struct ForwardConfig {
    /// Upstream resolver address.
    pub upstream: SocketAddr,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub retries: u32,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            upstream: SocketAddr::from(([8, 8, 8, 8], 53)),
            timeout: Duration::from_secs(2),
            retries: 2,
        }
    }
}
