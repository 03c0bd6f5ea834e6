//! Domain names in wire format, with compression support.
//!
//! A [`Name`] stores the uncompressed wire encoding (length-prefixed
//! labels ending in a zero byte) inline. Comparison and hashing are
//! case-insensitive per RFC 1035. [`parse_name`] decodes names from a
//! message, following compression pointers, and [`NameWriter`]
//! compresses repeated suffixes on encode.

use crate::error::{Error, Result};
use crate::wire::WireWriter;
use smallvec::SmallVec;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Maximum length of a single label.
pub const MAX_LABEL_LENGTH: usize = 63;

/// Maximum wire length of a full name.
pub const MAX_NAME_LENGTH: usize = 255;

/// Maximum number of compression pointers followed per name.
const MAX_COMPRESSION_JUMPS: usize = 64;

/// A fully-qualified domain name.
#[derive(Clone)]
pub struct Name {
    /// Uncompressed wire encoding, terminating zero byte included.
    wire: SmallVec<[u8; 64]>,
}

impl Name {
    /// Returns the root name.
    pub fn root() -> Self {
        Self {
            wire: SmallVec::from_slice(&[0]),
        }
    }

    /// Returns true if this is the root name.
    pub fn is_root(&self) -> bool {
        self.wire.len() == 1
    }

    /// Wire length of the name in bytes.
    pub fn wire_len(&self) -> usize {
        self.wire.len()
    }

    /// Raw uncompressed wire bytes.
    pub fn as_wire(&self) -> &[u8] {
        &self.wire
    }

    /// Iterates over the labels, top label first.
    pub fn labels(&self) -> impl Iterator<Item = &[u8]> {
        LabelIter {
            wire: &self.wire,
            pos: 0,
        }
    }

    /// Number of labels in the name.
    pub fn label_count(&self) -> usize {
        self.labels().count()
    }

    /// Returns a copy with all ASCII letters lowercased.
    pub fn lowercased(&self) -> Self {
        let mut wire = self.wire.clone();
        let mut pos = 0;
        while pos < wire.len() {
            let len = wire[pos] as usize;
            if len == 0 {
                break;
            }
            for byte in &mut wire[pos + 1..pos + 1 + len] {
                byte.make_ascii_lowercase();
            }
            pos += 1 + len;
        }
        Self { wire }
    }

    /// Returns true if this name equals `suffix` or falls under it.
    ///
    /// Comparison is per label and case-insensitive, so
    /// `pages.Camp.Local` is under `camp.local` but
    /// `notcamp.local` is not under `camp.local`.
    pub fn is_under(&self, suffix: &Name) -> bool {
        let own: Vec<&[u8]> = self.labels().collect();
        let other: Vec<&[u8]> = suffix.labels().collect();
        if other.len() > own.len() {
            return false;
        }
        own.iter()
            .rev()
            .zip(other.iter().rev())
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }

    /// Appends `suffix` to this name, producing `self.suffix`.
    ///
    /// Used to qualify relative record names against a zone suffix.
    pub fn joined(&self, suffix: &Name) -> Result<Name> {
        let mut wire: SmallVec<[u8; 64]> =
            SmallVec::from_slice(&self.wire[..self.wire.len() - 1]);
        wire.extend_from_slice(&suffix.wire);
        if wire.len() > MAX_NAME_LENGTH {
            return Err(Error::NameTooLong { length: wire.len() });
        }
        Ok(Name { wire })
    }

    /// Writes the uncompressed name.
    pub fn write_to(&self, writer: &mut WireWriter) -> Result<()> {
        writer.write_bytes(&self.wire)
    }

    fn from_wire_unchecked(wire: SmallVec<[u8; 64]>) -> Self {
        Self { wire }
    }
}

struct LabelIter<'a> {
    wire: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for LabelIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        let len = *self.wire.get(self.pos)? as usize;
        if len == 0 {
            return None;
        }
        let label = self.wire.get(self.pos + 1..self.pos + 1 + len)?;
        self.pos += 1 + len;
        Some(label)
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.wire.len() == other.wire.len()
            && self
                .wire
                .iter()
                .zip(other.wire.iter())
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in &self.wire {
            state.write_u8(byte.to_ascii_lowercase());
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        let mut first = true;
        for label in self.labels() {
            if !first {
                f.write_str(".")?;
            }
            first = false;
            for &byte in label {
                if byte.is_ascii_graphic() && byte != b'.' && byte != b'\\' {
                    write!(f, "{}", byte as char)?;
                } else {
                    write!(f, "\\{byte:03}")?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({self})")
    }
}

impl FromStr for Name {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.strip_suffix('.').unwrap_or(s);
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        let mut wire: SmallVec<[u8; 64]> = SmallVec::new();
        for label in trimmed.split('.') {
            if label.is_empty() {
                return Err(Error::InvalidName {
                    name: s.to_string(),
                    character: '.',
                });
            }
            if label.len() > MAX_LABEL_LENGTH {
                return Err(Error::LabelTooLong {
                    length: label.len(),
                });
            }
            for c in label.chars() {
                let ok = c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '*';
                if !ok {
                    return Err(Error::InvalidName {
                        name: s.to_string(),
                        character: c,
                    });
                }
            }
            wire.push(label.len() as u8);
            wire.extend_from_slice(label.as_bytes());
        }
        wire.push(0);

        if wire.len() > MAX_NAME_LENGTH {
            return Err(Error::NameTooLong { length: wire.len() });
        }
        Ok(Self { wire })
    }
}

/// Parses a possibly-compressed name out of a full message buffer.
///
/// Returns the name and the number of bytes consumed at `offset`
/// (a pointer counts as two bytes regardless of target length).
/// Pointers must target strictly earlier offsets and at most
/// [`MAX_COMPRESSION_JUMPS`] are followed, so a hostile message cannot
/// send the parser into a loop.
pub fn parse_name(data: &[u8], offset: usize) -> Result<(Name, usize)> {
    let mut wire: SmallVec<[u8; 64]> = SmallVec::new();
    let mut pos = offset;
    let mut consumed: Option<usize> = None;
    let mut jumps = 0usize;

    loop {
        let len_byte = *data.get(pos).ok_or(Error::unexpected_eof(pos))?;

        match len_byte & 0xC0 {
            0x00 => {
                let len = len_byte as usize;
                if len == 0 {
                    wire.push(0);
                    let end = pos + 1;
                    let consumed = consumed.unwrap_or_else(|| end - offset);
                    if wire.len() > MAX_NAME_LENGTH {
                        return Err(Error::NameTooLong { length: wire.len() });
                    }
                    return Ok((Name::from_wire_unchecked(wire), consumed));
                }
                let label = data
                    .get(pos + 1..pos + 1 + len)
                    .ok_or(Error::unexpected_eof(pos + 1))?;
                wire.push(len_byte);
                wire.extend_from_slice(label);
                if wire.len() + 1 > MAX_NAME_LENGTH {
                    return Err(Error::NameTooLong {
                        length: wire.len() + 1,
                    });
                }
                pos += 1 + len;
            }
            0xC0 => {
                let low = *data.get(pos + 1).ok_or(Error::unexpected_eof(pos + 1))?;
                let target = (usize::from(len_byte & 0x3F) << 8) | usize::from(low);
                if target >= pos {
                    return Err(Error::InvalidCompressionPointer {
                        offset: pos,
                        target,
                    });
                }
                jumps += 1;
                if jumps > MAX_COMPRESSION_JUMPS {
                    return Err(Error::TooManyCompressionJumps {
                        max_jumps: MAX_COMPRESSION_JUMPS,
                    });
                }
                // Bytes consumed at the original offset stop at the first pointer.
                consumed.get_or_insert(pos + 2 - offset);
                pos = target;
            }
            _ => {
                return Err(Error::invalid_data(pos, "reserved label type"));
            }
        }
    }
}

/// Writes names with suffix compression.
///
/// Each serialized suffix is remembered by a hash of its lowercased
/// wire form; later names sharing a suffix emit a pointer instead.
/// Only offsets representable in the 14-bit pointer field are recorded.
#[derive(Debug, Default)]
pub struct NameWriter {
    table: hashbrown::HashMap<u64, u16>,
}

impl NameWriter {
    /// Creates a writer with an empty compression table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes `name`, compressing against previously written names.
    pub fn write_name(&mut self, writer: &mut WireWriter, name: &Name) -> Result<()> {
        let wire = name.as_wire();
        let mut idx = 0;

        loop {
            let len = wire[idx] as usize;
            if len == 0 {
                return writer.write_u8(0);
            }

            let key = suffix_hash(&wire[idx..]);
            if let Some(&pointer) = self.table.get(&key) {
                return writer.write_u16(0xC000 | pointer);
            }

            let pos = writer.len();
            if pos <= 0x3FFF {
                self.table.insert(key, pos as u16);
            }
            writer.write_u8(wire[idx])?;
            writer.write_bytes(&wire[idx + 1..idx + 1 + len])?;
            idx += 1 + len;
        }
    }
}

fn suffix_hash(suffix: &[u8]) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    let mut hasher = DefaultHasher::new();
    for &byte in suffix {
        hasher.write_u8(byte.to_ascii_lowercase());
    }
    hasher.finish()
}
