//! Decode and encode errors for the DNS wire format.

use thiserror::Error;

/// Errors produced while parsing or serializing DNS messages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The buffer ended before the expected data.
    #[error("unexpected end of buffer at offset {offset}")]
    UnexpectedEof {
        /// Offset at which more data was expected.
        offset: usize,
    },

    /// A label exceeded the 63-byte limit.
    #[error("label length {length} exceeds the 63 byte limit")]
    LabelTooLong {
        /// The offending label length.
        length: usize,
    },

    /// A name exceeded the 255-byte wire limit.
    #[error("name length {length} exceeds the 255 byte limit")]
    NameTooLong {
        /// The offending name length.
        length: usize,
    },

    /// A compression pointer did not point strictly backwards.
    #[error("invalid compression pointer at offset {offset} targeting {target}")]
    InvalidCompressionPointer {
        /// Offset of the pointer.
        offset: usize,
        /// Target offset of the pointer.
        target: usize,
    },

    /// Too many compression pointers were chained.
    #[error("more than {max_jumps} compression jumps while reading a name")]
    TooManyCompressionJumps {
        /// The jump limit that was exceeded.
        max_jumps: usize,
    },

    /// RDATA did not have the length its type requires.
    #[error("rdata for {rtype} expected {expected} bytes, found {actual}")]
    RDataLengthMismatch {
        /// The record type being parsed.
        rtype: &'static str,
        /// Expected RDATA length.
        expected: usize,
        /// Actual RDATA length.
        actual: usize,
    },

    /// A label contained a character that cannot appear in a hostname.
    #[error("invalid character {character:?} in name {name:?}")]
    InvalidName {
        /// The textual name being parsed.
        name: String,
        /// The offending character.
        character: char,
    },

    /// The message would not fit the writer's size limit.
    #[error("message exceeds the maximum size of {max_size} bytes")]
    MessageTooLarge {
        /// The writer's configured limit.
        max_size: usize,
    },

    /// Structurally invalid data that fits no more specific variant.
    #[error("invalid data at offset {offset}: {message}")]
    InvalidData {
        /// Offset of the problem.
        offset: usize,
        /// Short description.
        message: &'static str,
    },
}

impl Error {
    /// Shorthand for [`Error::UnexpectedEof`].
    #[inline]
    pub const fn unexpected_eof(offset: usize) -> Self {
        Self::UnexpectedEof { offset }
    }

    /// Shorthand for [`Error::InvalidData`].
    #[inline]
    pub const fn invalid_data(offset: usize, message: &'static str) -> Self {
        Self::InvalidData { offset, message }
    }

    /// Returns true if the error describes malformed input from the peer,
    /// as opposed to a local encoding problem.
    pub const fn is_malformed(&self) -> bool {
        !matches!(self, Self::MessageTooLarge { .. })
    }
}

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, Error>;
