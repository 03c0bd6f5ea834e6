//! DNS response codes.

use num_enum::{FromPrimitive, IntoPrimitive};

/// Response code from the header (RFC 1035 section 4.1.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum ResponseCode {
    /// No error.
    NoError = 0,
    /// The server could not interpret the query.
    FormErr = 1,
    /// The server failed while processing the query.
    ServFail = 2,
    /// The queried name does not exist (authoritative only).
    NXDomain = 3,
    /// The query kind is not supported.
    NotImp = 4,
    /// The server refuses to answer for policy reasons.
    Refused = 5,
    /// Extended or unassigned value.
    #[num_enum(catch_all)]
    Unknown(u8),
}

impl ResponseCode {
    /// Numeric value of the response code.
    #[inline]
    pub fn to_u8(self) -> u8 {
        u8::from(self)
    }

    /// Returns true for NoError.
    #[inline]
    pub fn is_success(self) -> bool {
        matches!(self, Self::NoError)
    }
}

impl Default for ResponseCode {
    fn default() -> Self {
        Self::NoError
    }
}

impl std::fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoError => f.write_str("NOERROR"),
            Self::FormErr => f.write_str("FORMERR"),
            Self::ServFail => f.write_str("SERVFAIL"),
            Self::NXDomain => f.write_str("NXDOMAIN"),
            Self::NotImp => f.write_str("NOTIMP"),
            Self::Refused => f.write_str("REFUSED"),
            Self::Unknown(value) => write!(f, "RCODE{value}"),
        }
    }
}
