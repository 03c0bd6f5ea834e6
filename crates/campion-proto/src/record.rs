//! Resource records.

use crate::class::Class;
use crate::error::{Error, Result};
use crate::name::{parse_name, Name, NameWriter};
use crate::rdata::RData;
use crate::rtype::RecordType;
use crate::wire::{WireReader, WireWriter};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// A single resource record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    /// Owner name.
    pub name: Name,
    /// Record type.
    pub rtype: RecordType,
    /// Record class.
    pub class: Class,
    /// Time to live in seconds.
    pub ttl: u32,
    /// Type-specific data.
    pub rdata: RData,
}

impl ResourceRecord {
    /// Creates a record.
    pub fn new(name: Name, rtype: RecordType, class: Class, ttl: u32, rdata: RData) -> Self {
        Self {
            name,
            rtype,
            class,
            ttl,
            rdata,
        }
    }

    /// Creates an IN A record.
    pub fn a(name: Name, addr: Ipv4Addr, ttl: u32) -> Self {
        Self::new(name, RecordType::A, Class::IN, ttl, RData::A(addr))
    }

    /// Creates an IN AAAA record.
    pub fn aaaa(name: Name, addr: Ipv6Addr, ttl: u32) -> Self {
        Self::new(name, RecordType::AAAA, Class::IN, ttl, RData::Aaaa(addr))
    }

    /// Creates an IN CNAME record.
    pub fn cname(name: Name, target: Name, ttl: u32) -> Self {
        Self::new(name, RecordType::CNAME, Class::IN, ttl, RData::Cname(target))
    }

    /// Returns a copy of the record with a different TTL.
    pub fn with_ttl(&self, ttl: u32) -> Self {
        let mut record = self.clone();
        record.ttl = ttl;
        record
    }

    /// Parses a record at `offset`, returning it and the bytes consumed.
    pub fn parse(data: &[u8], offset: usize) -> Result<(Self, usize)> {
        let (name, name_len) = parse_name(data, offset)?;

        let mut reader = WireReader::at(data, offset + name_len);
        let rtype = RecordType::from(reader.read_u16()?);
        let class = Class::from(reader.read_u16()?);
        let ttl = reader.read_u32()?;
        let rd_len = reader.read_u16()? as usize;

        let rdata_offset = reader.position();
        if rdata_offset + rd_len > data.len() {
            return Err(Error::unexpected_eof(rdata_offset));
        }
        let rdata = RData::parse(rtype, data, rdata_offset, rd_len)?;

        Ok((
            Self {
                name,
                rtype,
                class,
                ttl,
                rdata,
            },
            name_len + 10 + rd_len,
        ))
    }

    /// Serializes the record, patching RDLENGTH after the body is
    /// written so name compression inside RDATA is accounted for.
    pub fn write_to(&self, writer: &mut WireWriter, names: &mut NameWriter) -> Result<()> {
        names.write_name(writer, &self.name)?;
        writer.write_u16(self.rtype.to_u16())?;
        writer.write_u16(self.class.to_u16())?;
        writer.write_u32(self.ttl)?;

        let rd_len_offset = writer.len();
        writer.write_u16(0)?;
        self.rdata.write_to(writer, names)?;
        let rd_len = writer.len() - rd_len_offset - 2;
        writer.patch_u16(rd_len_offset, rd_len as u16);

        Ok(())
    }
}

impl fmt::Display for ResourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.name, self.ttl, self.class, self.rtype, self.rdata
        )
    }
}

/// Returns the minimum TTL among `records`, if any.
pub fn min_ttl(records: &[ResourceRecord]) -> Option<u32> {
    records.iter().map(|r| r.ttl).min()
}
