//! Full DNS message assembly and parsing.

use crate::error::Result;
use crate::header::{Flags, Header, HEADER_SIZE};
use crate::name::NameWriter;
use crate::question::Question;
use crate::rcode::ResponseCode;
use crate::record::ResourceRecord;
use crate::wire::{WireReader, WireWriter};

/// A complete DNS message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    header: Header,
    questions: Vec<Question>,
    answers: Vec<ResourceRecord>,
    authorities: Vec<ResourceRecord>,
    additionals: Vec<ResourceRecord>,
}

impl Message {
    /// Creates a query for a single question with a random ID.
    pub fn query(question: Question) -> Self {
        Self {
            header: Header::query(),
            questions: vec![question],
            answers: Vec::new(),
            authorities: Vec::new(),
            additionals: Vec::new(),
        }
    }

    /// Creates an empty response echoing a query's ID, RD and question.
    pub fn response_from(query: &Message) -> Self {
        Self {
            header: Header::response_from(&query.header),
            questions: query.questions.clone(),
            answers: Vec::new(),
            authorities: Vec::new(),
            additionals: Vec::new(),
        }
    }

    /// Creates a bare FORMERR response for a message that could not be
    /// parsed, echoing only the transaction ID.
    pub fn format_error(id: u16) -> Self {
        let header = Header {
            id,
            flags: Flags::QR,
            opcode: crate::opcode::OpCode::Query,
            rcode: ResponseCode::FormErr,
            qd_count: 0,
            an_count: 0,
            ns_count: 0,
            ar_count: 0,
        };
        Self {
            header,
            questions: Vec::new(),
            answers: Vec::new(),
            authorities: Vec::new(),
            additionals: Vec::new(),
        }
    }

    /// Transaction ID.
    pub fn id(&self) -> u16 {
        self.header.id
    }

    /// Replaces the transaction ID.
    pub fn set_id(&mut self, id: u16) {
        self.header.id = id;
    }

    /// Response code.
    pub fn rcode(&self) -> ResponseCode {
        self.header.rcode
    }

    /// Replaces the response code.
    pub fn set_rcode(&mut self, rcode: ResponseCode) {
        self.header.rcode = rcode;
    }

    /// Header flags.
    pub fn flags(&self) -> Flags {
        self.header.flags
    }

    /// Marks the response authoritative.
    pub fn set_authoritative(&mut self, authoritative: bool) {
        self.header.flags.set(Flags::AA, authoritative);
    }

    /// Marks recursion as available.
    pub fn set_recursion_available(&mut self, available: bool) {
        self.header.flags.set(Flags::RA, available);
    }

    /// Returns true if RD was set by the client.
    pub fn recursion_desired(&self) -> bool {
        self.header.flags.contains(Flags::RD)
    }

    /// Returns true if this is a response.
    pub fn is_response(&self) -> bool {
        self.header.is_response()
    }

    /// Returns true if the truncation flag is set.
    pub fn is_truncated(&self) -> bool {
        self.header.is_truncated()
    }

    /// Message opcode.
    pub fn opcode(&self) -> crate::opcode::OpCode {
        self.header.opcode
    }

    /// Question section.
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// First question, if any.
    pub fn question(&self) -> Option<&Question> {
        self.questions.first()
    }

    /// Answer section.
    pub fn answers(&self) -> &[ResourceRecord] {
        &self.answers
    }

    /// Authority section.
    pub fn authorities(&self) -> &[ResourceRecord] {
        &self.authorities
    }

    /// Additional section.
    pub fn additionals(&self) -> &[ResourceRecord] {
        &self.additionals
    }

    /// Appends an answer record.
    pub fn add_answer(&mut self, record: ResourceRecord) {
        self.answers.push(record);
    }

    /// Appends an authority record.
    pub fn add_authority(&mut self, record: ResourceRecord) {
        self.authorities.push(record);
    }

    /// Parses a complete message.
    ///
    /// Section counts come from the header; if the buffer runs out
    /// before the declared records the parse fails, which callers
    /// answer with FORMERR.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = WireReader::new(data);
        let header = Header::parse(&mut reader)?;

        let mut offset = HEADER_SIZE;
        let mut questions = Vec::with_capacity(usize::from(header.qd_count.min(8)));
        for _ in 0..header.qd_count {
            let (question, consumed) = Question::parse(data, offset)?;
            offset += consumed;
            questions.push(question);
        }

        let mut parse_section = |count: u16, offset: &mut usize| -> Result<Vec<ResourceRecord>> {
            let mut records = Vec::with_capacity(usize::from(count.min(32)));
            for _ in 0..count {
                let (record, consumed) = ResourceRecord::parse(data, *offset)?;
                *offset += consumed;
                records.push(record);
            }
            Ok(records)
        };

        let answers = parse_section(header.an_count, &mut offset)?;
        let authorities = parse_section(header.ns_count, &mut offset)?;
        let additionals = parse_section(header.ar_count, &mut offset)?;

        Ok(Self {
            header,
            questions,
            answers,
            authorities,
            additionals,
        })
    }

    fn write_to(&self, writer: &mut WireWriter, names: &mut NameWriter) -> Result<()> {
        let mut header = self.header;
        header.qd_count = self.questions.len() as u16;
        header.an_count = self.answers.len() as u16;
        header.ns_count = self.authorities.len() as u16;
        header.ar_count = self.additionals.len() as u16;
        header.write_to(writer)?;

        for question in &self.questions {
            question.write_to(writer, names)?;
        }
        for record in self
            .answers
            .iter()
            .chain(&self.authorities)
            .chain(&self.additionals)
        {
            record.write_to(writer, names)?;
        }
        Ok(())
    }

    /// Serializes the message with name compression.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut writer = WireWriter::new();
        let mut names = NameWriter::new();
        // The unbounded writer cannot fail.
        let _ = self.write_to(&mut writer, &mut names);
        writer.finish()
    }

    /// Serialized size in bytes.
    pub fn wire_size(&self) -> usize {
        self.to_wire().len()
    }

    /// Drops records until the message fits in `max_size` bytes and
    /// sets TC if anything was dropped. Additionals go first, then
    /// authorities, then answers; the question always survives.
    pub fn truncate_to(&mut self, max_size: usize) {
        while self.wire_size() > max_size {
            let dropped = self.additionals.pop().is_some()
                || self.authorities.pop().is_some()
                || self.answers.pop().is_some();
            if !dropped {
                break;
            }
            self.header.flags |= Flags::TC;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::Class;
    use crate::rtype::RecordType;
    use bytes::Bytes;
    use std::net::Ipv4Addr;

    fn sample_query() -> Message {
        Message::query(Question::a("pages.camp.local".parse().unwrap()))
    }

    #[test]
    fn test_query_roundtrip() {
        let query = sample_query();
        let wire = query.to_wire();
        let parsed = Message::parse(&wire).unwrap();

        assert_eq!(parsed.id(), query.id());
        assert_eq!(parsed.questions(), query.questions());
        assert!(!parsed.is_response());
        assert!(parsed.recursion_desired());
    }

    #[test]
    fn test_response_roundtrip_with_compression() {
        let query = sample_query();
        let mut response = Message::response_from(&query);
        response.set_authoritative(true);
        response.add_answer(ResourceRecord::a(
            "pages.camp.local".parse().unwrap(),
            Ipv4Addr::new(10, 0, 0, 5),
            300,
        ));

        let wire = response.to_wire();
        let parsed = Message::parse(&wire).unwrap();

        assert_eq!(parsed.id(), query.id());
        assert_eq!(parsed.answers().len(), 1);
        assert_eq!(parsed.answers()[0].rdata.as_a(), Some(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(parsed.answers()[0].ttl, 300);
        assert!(parsed.flags().contains(Flags::AA));

        // Compression: the answer owner name is a pointer to the question.
        let uncompressed = 12 + 18 + 4 + 18 + 10 + 4;
        assert!(wire.len() < uncompressed);
    }

    #[test]
    fn test_parse_truncated_header() {
        assert!(Message::parse(&[0x12, 0x34, 0x01]).is_err());
    }

    #[test]
    fn test_parse_count_exceeds_buffer() {
        // Header declares one question but the buffer ends after it.
        let mut wire = sample_query().to_wire();
        wire[5] = 3; // qd_count = 3
        assert!(Message::parse(&wire).is_err());
    }

    #[test]
    fn test_format_error_response() {
        let response = Message::format_error(0x4242);
        let wire = response.to_wire();
        let parsed = Message::parse(&wire).unwrap();

        assert_eq!(parsed.id(), 0x4242);
        assert_eq!(parsed.rcode(), ResponseCode::FormErr);
        assert!(parsed.is_response());
        assert!(parsed.questions().is_empty());
    }

    #[test]
    fn test_truncate_to_sets_tc() {
        let query = Message::query(Question::new(
            "big.camp.local".parse().unwrap(),
            RecordType::TXT,
            Class::IN,
        ));
        let mut response = Message::response_from(&query);
        for _ in 0..40 {
            response.add_answer(ResourceRecord::new(
                "big.camp.local".parse().unwrap(),
                RecordType::TXT,
                Class::IN,
                60,
                crate::rdata::RData::Txt(vec![Bytes::from(vec![b'x'; 64])]),
            ));
        }
        assert!(response.wire_size() > 512);

        response.truncate_to(512);
        assert!(response.wire_size() <= 512);
        assert!(response.is_truncated());
        assert_eq!(response.questions().len(), 1);
    }
}
