//! The fixed 12-byte DNS message header.

use crate::error::Result;
use crate::opcode::OpCode;
use crate::rcode::ResponseCode;
use crate::wire::{WireReader, WireWriter};
use bitflags::bitflags;

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 12;

bitflags! {
    /// Header flag bits (QR, AA, TC, RD, RA).
    ///
    /// The opcode and rcode live in the same 16-bit field but are
    /// carried separately in [`Header`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u16 {
        /// Query (0) or response (1).
        const QR = 0x8000;
        /// Authoritative answer.
        const AA = 0x0400;
        /// Truncated response.
        const TC = 0x0200;
        /// Recursion desired.
        const RD = 0x0100;
        /// Recursion available.
        const RA = 0x0080;
    }
}

/// Parsed DNS message header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Transaction ID correlating responses with queries.
    pub id: u16,
    /// Flag bits.
    pub flags: Flags,
    /// Operation code.
    pub opcode: OpCode,
    /// Response code.
    pub rcode: ResponseCode,
    /// Question count.
    pub qd_count: u16,
    /// Answer count.
    pub an_count: u16,
    /// Authority count.
    pub ns_count: u16,
    /// Additional count.
    pub ar_count: u16,
}

impl Header {
    /// Creates a query header with a random transaction ID and RD set.
    pub fn query() -> Self {
        Self {
            id: rand::random(),
            flags: Flags::RD,
            opcode: OpCode::Query,
            rcode: ResponseCode::NoError,
            qd_count: 0,
            an_count: 0,
            ns_count: 0,
            ar_count: 0,
        }
    }

    /// Creates a response header echoing a query's ID, opcode and RD.
    pub fn response_from(query: &Header) -> Self {
        let mut flags = Flags::QR;
        if query.flags.contains(Flags::RD) {
            flags |= Flags::RD;
        }
        Self {
            id: query.id,
            flags,
            opcode: query.opcode,
            rcode: ResponseCode::NoError,
            qd_count: 0,
            an_count: 0,
            ns_count: 0,
            ar_count: 0,
        }
    }

    /// Parses the header from the front of a message.
    pub fn parse(reader: &mut WireReader<'_>) -> Result<Self> {
        let id = reader.read_u16()?;
        let raw_flags = reader.read_u16()?;

        let opcode = OpCode::from(((raw_flags >> 11) & 0x0F) as u8);
        let rcode = ResponseCode::from((raw_flags & 0x0F) as u8);
        let flags = Flags::from_bits_truncate(raw_flags);

        Ok(Self {
            id,
            flags,
            opcode,
            rcode,
            qd_count: reader.read_u16()?,
            an_count: reader.read_u16()?,
            ns_count: reader.read_u16()?,
            ar_count: reader.read_u16()?,
        })
    }

    /// Serializes the header.
    pub fn write_to(&self, writer: &mut WireWriter) -> Result<()> {
        let mut raw = self.flags.bits();
        raw |= u16::from(self.opcode.to_u8() & 0x0F) << 11;
        raw |= u16::from(self.rcode.to_u8() & 0x0F);

        writer.write_u16(self.id)?;
        writer.write_u16(raw)?;
        writer.write_u16(self.qd_count)?;
        writer.write_u16(self.an_count)?;
        writer.write_u16(self.ns_count)?;
        writer.write_u16(self.ar_count)
    }

    /// Returns true if this is a response header.
    #[inline]
    pub fn is_response(&self) -> bool {
        self.flags.contains(Flags::QR)
    }

    /// Returns true if the response was truncated.
    #[inline]
    pub fn is_truncated(&self) -> bool {
        self.flags.contains(Flags::TC)
    }
}

/// Reads the transaction ID from a raw buffer if at least two bytes
/// are present. Lets the listener answer FORMERR for messages too
/// damaged to parse fully.
pub fn peek_id(data: &[u8]) -> Option<u16> {
    let bytes = data.get(0..2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = Header {
            id: 0xBEEF,
            flags: Flags::QR | Flags::AA | Flags::RD,
            opcode: OpCode::Query,
            rcode: ResponseCode::NXDomain,
            qd_count: 1,
            an_count: 2,
            ns_count: 0,
            ar_count: 0,
        };

        let mut writer = WireWriter::new();
        header.write_to(&mut writer).unwrap();
        let bytes = writer.finish();
        assert_eq!(bytes.len(), HEADER_SIZE);

        let mut reader = WireReader::new(&bytes);
        let parsed = Header::parse(&mut reader).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_response_from_copies_id_and_rd() {
        let mut query = Header::query();
        query.id = 42;
        let response = Header::response_from(&query);

        assert_eq!(response.id, 42);
        assert!(response.is_response());
        assert!(response.flags.contains(Flags::RD));

        query.flags.remove(Flags::RD);
        let response = Header::response_from(&query);
        assert!(!response.flags.contains(Flags::RD));
    }

    #[test]
    fn test_header_truncated_buffer() {
        let data = [0x00, 0x01, 0x02];
        let mut reader = WireReader::new(&data);
        assert!(Header::parse(&mut reader).is_err());
    }

    #[test]
    fn test_peek_id() {
        assert_eq!(peek_id(&[0x12, 0x34, 0x00]), Some(0x1234));
        assert_eq!(peek_id(&[0x12]), None);
    }
}
