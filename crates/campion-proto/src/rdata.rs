//! Type-specific record data.
//!
//! [`RData`] is a closed tagged enum so the zone loader can validate a
//! value's shape against its declared type exhaustively. Types outside
//! the served set are carried as opaque bytes so forwarded responses
//! survive a decode/encode round trip.

use crate::error::{Error, Result};
use crate::name::{parse_name, Name, NameWriter};
use crate::rtype::RecordType;
use crate::wire::WireWriter;
use bytes::Bytes;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Record data, tagged by record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    /// An IPv4 address.
    A(Ipv4Addr),
    /// An IPv6 address.
    Aaaa(Ipv6Addr),
    /// A canonical name target.
    Cname(Name),
    /// A delegated name server.
    Ns(Name),
    /// A pointer target.
    Ptr(Name),
    /// A mail exchange with preference.
    Mx {
        /// Lower is preferred.
        preference: u16,
        /// Mail server name.
        exchange: Name,
    },
    /// One or more character strings, each at most 255 bytes.
    Txt(Vec<Bytes>),
    /// Start of authority.
    Soa {
        /// Primary name server.
        mname: Name,
        /// Responsible mailbox, encoded as a name.
        rname: Name,
        /// Zone serial.
        serial: u32,
        /// Secondary refresh interval.
        refresh: u32,
        /// Secondary retry interval.
        retry: u32,
        /// Secondary expiry.
        expire: u32,
        /// Minimum / negative-caching TTL.
        minimum: u32,
    },
    /// Raw RDATA for a type this server does not interpret.
    Unknown(Bytes),
}

impl RData {
    /// Parses RDATA for `rtype` from the slice at
    /// `data[offset..offset + len]`.
    ///
    /// The full message buffer is required because name-bearing types
    /// may use compression pointers into earlier sections.
    pub fn parse(rtype: RecordType, data: &[u8], offset: usize, len: usize) -> Result<Self> {
        let end = offset
            .checked_add(len)
            .ok_or(Error::unexpected_eof(offset))?;
        let slice = data.get(offset..end).ok_or(Error::unexpected_eof(offset))?;

        match rtype {
            RecordType::A => {
                let bytes: [u8; 4] = slice.try_into().map_err(|_| Error::RDataLengthMismatch {
                    rtype: "A",
                    expected: 4,
                    actual: len,
                })?;
                Ok(Self::A(Ipv4Addr::from(bytes)))
            }
            RecordType::AAAA => {
                let bytes: [u8; 16] = slice.try_into().map_err(|_| Error::RDataLengthMismatch {
                    rtype: "AAAA",
                    expected: 16,
                    actual: len,
                })?;
                Ok(Self::Aaaa(Ipv6Addr::from(bytes)))
            }
            RecordType::CNAME => Ok(Self::Cname(Self::parse_sole_name(data, offset, len)?)),
            RecordType::NS => Ok(Self::Ns(Self::parse_sole_name(data, offset, len)?)),
            RecordType::PTR => Ok(Self::Ptr(Self::parse_sole_name(data, offset, len)?)),
            RecordType::MX => {
                if len < 3 {
                    return Err(Error::RDataLengthMismatch {
                        rtype: "MX",
                        expected: 3,
                        actual: len,
                    });
                }
                let preference = u16::from_be_bytes([slice[0], slice[1]]);
                let (exchange, _) = parse_name(data, offset + 2)?;
                Ok(Self::Mx {
                    preference,
                    exchange,
                })
            }
            RecordType::TXT => {
                let mut strings = Vec::new();
                let mut pos = 0;
                while pos < slice.len() {
                    let str_len = slice[pos] as usize;
                    let string = slice.get(pos + 1..pos + 1 + str_len).ok_or(
                        Error::unexpected_eof(offset + pos + 1),
                    )?;
                    strings.push(Bytes::copy_from_slice(string));
                    pos += 1 + str_len;
                }
                Ok(Self::Txt(strings))
            }
            RecordType::SOA => {
                let (mname, mname_len) = parse_name(data, offset)?;
                let (rname, rname_len) = parse_name(data, offset + mname_len)?;
                let fixed = data
                    .get(offset + mname_len + rname_len..end)
                    .filter(|rest| rest.len() >= 20)
                    .ok_or(Error::RDataLengthMismatch {
                        rtype: "SOA",
                        expected: 20,
                        actual: len.saturating_sub(mname_len + rname_len),
                    })?;
                let field =
                    |i: usize| u32::from_be_bytes([fixed[i], fixed[i + 1], fixed[i + 2], fixed[i + 3]]);
                Ok(Self::Soa {
                    mname,
                    rname,
                    serial: field(0),
                    refresh: field(4),
                    retry: field(8),
                    expire: field(12),
                    minimum: field(16),
                })
            }
            _ => Ok(Self::Unknown(Bytes::copy_from_slice(slice))),
        }
    }

    fn parse_sole_name(data: &[u8], offset: usize, len: usize) -> Result<Name> {
        if len == 0 {
            return Err(Error::unexpected_eof(offset));
        }
        let (name, _) = parse_name(data, offset)?;
        Ok(name)
    }

    /// Returns the record type this data belongs to.
    ///
    /// [`RData::Unknown`] has no inherent type; the owning record
    /// carries it.
    pub fn record_type(&self) -> Option<RecordType> {
        match self {
            Self::A(_) => Some(RecordType::A),
            Self::Aaaa(_) => Some(RecordType::AAAA),
            Self::Cname(_) => Some(RecordType::CNAME),
            Self::Ns(_) => Some(RecordType::NS),
            Self::Ptr(_) => Some(RecordType::PTR),
            Self::Mx { .. } => Some(RecordType::MX),
            Self::Txt(_) => Some(RecordType::TXT),
            Self::Soa { .. } => Some(RecordType::SOA),
            Self::Unknown(_) => None,
        }
    }

    /// Serializes the RDATA body (without the RDLENGTH prefix).
    pub fn write_to(&self, writer: &mut WireWriter, names: &mut NameWriter) -> Result<()> {
        match self {
            Self::A(addr) => writer.write_bytes(&addr.octets()),
            Self::Aaaa(addr) => writer.write_bytes(&addr.octets()),
            Self::Cname(name) | Self::Ns(name) | Self::Ptr(name) => {
                names.write_name(writer, name)
            }
            Self::Mx {
                preference,
                exchange,
            } => {
                writer.write_u16(*preference)?;
                names.write_name(writer, exchange)
            }
            Self::Txt(strings) => {
                for string in strings {
                    let len = string.len().min(255) as u8;
                    writer.write_u8(len)?;
                    writer.write_bytes(&string[..len as usize])?;
                }
                Ok(())
            }
            Self::Soa {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                names.write_name(writer, mname)?;
                names.write_name(writer, rname)?;
                writer.write_u32(*serial)?;
                writer.write_u32(*refresh)?;
                writer.write_u32(*retry)?;
                writer.write_u32(*expire)?;
                writer.write_u32(*minimum)
            }
            Self::Unknown(bytes) => writer.write_bytes(bytes),
        }
    }

    /// Returns the CNAME target if this is a CNAME.
    pub fn as_cname(&self) -> Option<&Name> {
        match self {
            Self::Cname(name) => Some(name),
            _ => None,
        }
    }

    /// Returns the IPv4 address if this is an A record.
    pub fn as_a(&self) -> Option<Ipv4Addr> {
        match self {
            Self::A(addr) => Some(*addr),
            _ => None,
        }
    }
}

impl fmt::Display for RData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A(addr) => write!(f, "{addr}"),
            Self::Aaaa(addr) => write!(f, "{addr}"),
            Self::Cname(name) | Self::Ns(name) | Self::Ptr(name) => write!(f, "{name}"),
            Self::Mx {
                preference,
                exchange,
            } => write!(f, "{preference} {exchange}"),
            Self::Txt(strings) => {
                let mut first = true;
                for string in strings {
                    if !first {
                        f.write_str(" ")?;
                    }
                    first = false;
                    write!(f, "{:?}", String::from_utf8_lossy(string))?;
                }
                Ok(())
            }
            Self::Soa { mname, rname, serial, .. } => {
                write!(f, "{mname} {rname} {serial}")
            }
            Self::Unknown(bytes) => write!(f, "\\# {}", bytes.len()),
        }
    }
}
