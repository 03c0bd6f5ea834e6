//! DNS operation codes.

use num_enum::{FromPrimitive, IntoPrimitive};

/// Operation code from the header (RFC 1035 section 4.1.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum OpCode {
    /// Standard query.
    Query = 0,
    /// Server status request.
    Status = 2,
    /// Zone change notification (RFC 1996).
    Notify = 4,
    /// Dynamic update (RFC 2136).
    Update = 5,
    /// Reserved or unassigned value.
    #[num_enum(catch_all)]
    Unknown(u8),
}

impl OpCode {
    /// Numeric value of the opcode.
    #[inline]
    pub fn to_u8(self) -> u8 {
        u8::from(self)
    }
}

impl Default for OpCode {
    fn default() -> Self {
        Self::Query
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Query => f.write_str("QUERY"),
            Self::Status => f.write_str("STATUS"),
            Self::Notify => f.write_str("NOTIFY"),
            Self::Update => f.write_str("UPDATE"),
            Self::Unknown(value) => write!(f, "OPCODE{value}"),
        }
    }
}
