//! DNS record classes.

use num_enum::{FromPrimitive, IntoPrimitive};
use std::fmt;

/// DNS record class. Everything served locally is IN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, FromPrimitive)]
#[repr(u16)]
pub enum Class {
    /// Internet.
    IN = 1,
    /// Chaos.
    CH = 3,
    /// Hesiod.
    HS = 4,
    /// Any class (query-only pseudo-class).
    ANY = 255,
    /// Any other class, carried opaquely.
    #[num_enum(catch_all)]
    Unknown(u16),
}

impl Class {
    /// Numeric value of the class.
    #[inline]
    pub fn to_u16(self) -> u16 {
        u16::from(self)
    }
}

impl Default for Class {
    fn default() -> Self {
        Self::IN
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IN => f.write_str("IN"),
            Self::CH => f.write_str("CH"),
            Self::HS => f.write_str("HS"),
            Self::ANY => f.write_str("ANY"),
            Self::Unknown(value) => write!(f, "CLASS{value}"),
        }
    }
}
