//! The question section of a DNS message.

use crate::class::Class;
use crate::error::Result;
use crate::name::{parse_name, Name, NameWriter};
use crate::rtype::RecordType;
use crate::wire::{WireReader, WireWriter};
use std::fmt;

/// A single question: name, type and class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Question {
    /// Queried name.
    pub qname: Name,
    /// Queried record type.
    pub qtype: RecordType,
    /// Queried class.
    pub qclass: Class,
}

impl Question {
    /// Creates a question.
    pub fn new(qname: Name, qtype: RecordType, qclass: Class) -> Self {
        Self {
            qname,
            qtype,
            qclass,
        }
    }

    /// Creates an IN A question.
    pub fn a(qname: Name) -> Self {
        Self::new(qname, RecordType::A, Class::IN)
    }

    /// Creates an IN AAAA question.
    pub fn aaaa(qname: Name) -> Self {
        Self::new(qname, RecordType::AAAA, Class::IN)
    }

    /// Parses a question at `offset`, returning it and the bytes consumed.
    pub fn parse(data: &[u8], offset: usize) -> Result<(Self, usize)> {
        let (qname, name_len) = parse_name(data, offset)?;

        let mut reader = WireReader::at(data, offset + name_len);
        let qtype = RecordType::from(reader.read_u16()?);
        let qclass = Class::from(reader.read_u16()?);

        Ok((
            Self {
                qname,
                qtype,
                qclass,
            },
            name_len + 4,
        ))
    }

    /// Serializes the question.
    pub fn write_to(&self, writer: &mut WireWriter, names: &mut NameWriter) -> Result<()> {
        names.write_name(writer, &self.qname)?;
        writer.write_u16(self.qtype.to_u16())?;
        writer.write_u16(self.qclass.to_u16())
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.qname, self.qclass, self.qtype)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_roundtrip() {
        let question = Question::a("pages.camp.local".parse().unwrap());

        let mut writer = WireWriter::new();
        let mut names = NameWriter::new();
        question.write_to(&mut writer, &mut names).unwrap();
        let bytes = writer.finish();

        let (parsed, consumed) = Question::parse(&bytes, 0).unwrap();
        assert_eq!(parsed, question);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_question_truncated() {
        let bytes = b"\x04camp\x05local\x00\x00";
        assert!(Question::parse(bytes, 0).is_err());
    }

    #[test]
    fn test_question_unknown_type() {
        let mut writer = WireWriter::new();
        let mut names = NameWriter::new();
        let question = Question::new(
            "x.camp.local".parse().unwrap(),
            RecordType::Unknown(64),
            Class::IN,
        );
        question.write_to(&mut writer, &mut names).unwrap();

        let (parsed, _) = Question::parse(&writer.finish(), 0).unwrap();
        assert_eq!(parsed.qtype, RecordType::Unknown(64));
    }
}
