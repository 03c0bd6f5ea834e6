//! DNS record types.

use num_enum::{FromPrimitive, IntoPrimitive};
use std::fmt;
use std::str::FromStr;

/// DNS record type.
///
/// Covers the RFC 1035 core plus AAAA; anything else is carried as
/// [`RecordType::Unknown`] so forwarded records of any type survive
/// a decode/encode round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, FromPrimitive)]
#[repr(u16)]
pub enum RecordType {
    /// IPv4 address.
    A = 1,
    /// Authoritative name server.
    NS = 2,
    /// Canonical name (alias).
    CNAME = 5,
    /// Start of authority.
    SOA = 6,
    /// Domain name pointer.
    PTR = 12,
    /// Mail exchange.
    MX = 15,
    /// Text strings.
    TXT = 16,
    /// IPv6 address (RFC 3596).
    AAAA = 28,
    /// Any type (query-only pseudo-type).
    ANY = 255,
    /// Any other type, carried opaquely.
    #[num_enum(catch_all)]
    Unknown(u16),
}

impl RecordType {
    /// Numeric value of the record type.
    #[inline]
    pub fn to_u16(self) -> u16 {
        u16::from(self)
    }

    /// Returns true for address types (A and AAAA).
    #[inline]
    pub fn is_address(self) -> bool {
        matches!(self, Self::A | Self::AAAA)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => f.write_str("A"),
            Self::NS => f.write_str("NS"),
            Self::CNAME => f.write_str("CNAME"),
            Self::SOA => f.write_str("SOA"),
            Self::PTR => f.write_str("PTR"),
            Self::MX => f.write_str("MX"),
            Self::TXT => f.write_str("TXT"),
            Self::AAAA => f.write_str("AAAA"),
            Self::ANY => f.write_str("ANY"),
            Self::Unknown(value) => write!(f, "TYPE{value}"),
        }
    }
}

/// Parse error for textual record types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown record type {0:?}")]
pub struct ParseRecordTypeError(pub String);

impl FromStr for RecordType {
    type Err = ParseRecordTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(Self::A),
            "NS" => Ok(Self::NS),
            "CNAME" => Ok(Self::CNAME),
            "SOA" => Ok(Self::SOA),
            "PTR" => Ok(Self::PTR),
            "MX" => Ok(Self::MX),
            "TXT" => Ok(Self::TXT),
            "AAAA" => Ok(Self::AAAA),
            "ANY" => Ok(Self::ANY),
            other => match other.strip_prefix("TYPE").and_then(|n| n.parse::<u16>().ok()) {
                Some(value) => Ok(Self::from(value)),
                None => Err(ParseRecordTypeError(s.to_string())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rtype_values() {
        assert_eq!(RecordType::A.to_u16(), 1);
        assert_eq!(RecordType::AAAA.to_u16(), 28);
        assert_eq!(RecordType::from(28), RecordType::AAAA);
        assert_eq!(RecordType::from(64), RecordType::Unknown(64));
        assert_eq!(RecordType::Unknown(64).to_u16(), 64);
    }

    #[test]
    fn test_rtype_from_str() {
        assert_eq!("a".parse::<RecordType>().unwrap(), RecordType::A);
        assert_eq!("CNAME".parse::<RecordType>().unwrap(), RecordType::CNAME);
        assert_eq!(
            "TYPE64".parse::<RecordType>().unwrap(),
            RecordType::Unknown(64)
        );
        assert!("BOGUS".parse::<RecordType>().is_err());
    }

    #[test]
    fn test_rtype_display() {
        assert_eq!(RecordType::TXT.to_string(), "TXT");
        assert_eq!(RecordType::Unknown(64).to_string(), "TYPE64");
    }
}
