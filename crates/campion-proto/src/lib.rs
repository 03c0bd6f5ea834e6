//! DNS wire format encoding and decoding.
//!
//! Implements the subset of RFC 1035 (plus AAAA from RFC 3596) that an
//! authoritative-plus-forwarding server for a small network needs:
//! header and flag handling, names with compression on both decode and
//! encode, the question section, resource records with typed RDATA,
//! full message assembly and UDP truncation.
//!
//! Parsing is defensive throughout: truncated buffers, oversized
//! labels or names, and compression pointer loops all surface as
//! [`Error`] values rather than panics, so one hostile packet costs
//! one FORMERR response and nothing else.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod class;
pub mod error;
pub mod header;
pub mod message;
pub mod name;
pub mod opcode;
pub mod question;
pub mod rcode;
pub mod rdata;
pub mod record;
pub mod rtype;
pub mod wire;

pub use class::Class;
pub use error::{Error, Result};
pub use header::{peek_id, Flags, Header, HEADER_SIZE};
pub use message::Message;
pub use name::{Name, NameWriter};
pub use opcode::OpCode;
pub use question::Question;
pub use rcode::ResponseCode;
pub use rdata::RData;
pub use record::{min_ttl, ResourceRecord};
pub use rtype::RecordType;

/// Largest DNS message over plain UDP without extension signaling.
pub const MAX_UDP_MESSAGE_SIZE: usize = 512;

/// Largest DNS message over TCP (bounded by the length prefix).
pub const MAX_TCP_MESSAGE_SIZE: usize = 65535;

/// Standard DNS port.
pub const DNS_PORT: u16 = 53;
