//! Low-level wire reading and writing primitives.

use crate::error::{Error, Result};
use bytes::{BufMut, BytesMut};

/// A bounds-checked reader over a DNS message buffer.
///
/// Keeps the whole message available so name parsing can follow
/// compression pointers into earlier parts of the buffer.
#[derive(Debug)]
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Creates a reader positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Creates a reader positioned at `pos`.
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    /// Returns the current read position.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns the full underlying buffer.
    #[inline]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Returns the number of bytes left to read.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or(Error::unexpected_eof(self.pos))?;
        self.pos += 1;
        Ok(byte)
    }

    /// Reads a big-endian u16.
    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Reads a big-endian u32.
    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .ok_or(Error::unexpected_eof(self.pos))?;
        if end > self.data.len() {
            return Err(Error::unexpected_eof(self.pos));
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Advances the position by `len` bytes without reading.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len)?;
        Ok(())
    }
}

/// A growable writer with an optional size limit.
///
/// The limit is used when serializing UDP responses so oversized
/// messages are caught before transmission.
#[derive(Debug)]
pub struct WireWriter {
    buf: BytesMut,
    max_size: Option<usize>,
}

impl WireWriter {
    /// Creates an unbounded writer.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(512),
            max_size: None,
        }
    }

    /// Creates a writer that fails once `max_size` bytes would be exceeded.
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(max_size.min(512)),
            max_size: Some(max_size),
        }
    }

    /// Current number of bytes written.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing has been written yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn check(&self, additional: usize) -> Result<()> {
        if let Some(max) = self.max_size {
            if self.buf.len() + additional > max {
                return Err(Error::MessageTooLarge { max_size: max });
            }
        }
        Ok(())
    }

    /// Writes a single byte.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.check(1)?;
        self.buf.put_u8(value);
        Ok(())
    }

    /// Writes a big-endian u16.
    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.check(2)?;
        self.buf.put_u16(value);
        Ok(())
    }

    /// Writes a big-endian u32.
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.check(4)?;
        self.buf.put_u32(value);
        Ok(())
    }

    /// Writes a byte slice.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.check(bytes.len())?;
        self.buf.put_slice(bytes);
        Ok(())
    }

    /// Overwrites a previously written big-endian u16 at `offset`.
    ///
    /// Used to patch section counts and the RDLENGTH field after
    /// their contents have been serialized.
    pub fn patch_u16(&mut self, offset: usize, value: u16) {
        if offset + 2 <= self.buf.len() {
            self.buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
        }
    }

    /// Consumes the writer and returns the serialized bytes.
    pub fn finish(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

impl Default for WireWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_roundtrip() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde];
        let mut reader = WireReader::new(&data);

        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_u32().unwrap(), 0x5678_9abc);
        assert_eq!(reader.read_u8().unwrap(), 0xde);
        assert_eq!(reader.remaining(), 0);
        assert!(reader.read_u8().is_err());
    }

    #[test]
    fn test_reader_eof() {
        let data = [0x01];
        let mut reader = WireReader::new(&data);
        assert_eq!(
            reader.read_u16(),
            Err(Error::unexpected_eof(0))
        );
    }

    #[test]
    fn test_writer_limit() {
        let mut writer = WireWriter::with_max_size(3);
        writer.write_u16(0xabcd).unwrap();
        writer.write_u8(0xef).unwrap();
        assert!(matches!(
            writer.write_u8(0x00),
            Err(Error::MessageTooLarge { max_size: 3 })
        ));
        assert_eq!(writer.finish(), vec![0xab, 0xcd, 0xef]);
    }

    #[test]
    fn test_writer_patch() {
        let mut writer = WireWriter::new();
        writer.write_u16(0).unwrap();
        writer.write_u8(7).unwrap();
        writer.patch_u16(0, 0x0102);
        assert_eq!(writer.finish(), vec![0x01, 0x02, 0x07]);
    }
}
