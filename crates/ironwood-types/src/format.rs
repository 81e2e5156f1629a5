//! Engine key/value format tags.
//!
//! Single-character type codes carried by table metadata. The model only
//! consults them at the engine/log boundary (decoding raw keys and values,
//! size validation); model logic itself is untyped beyond [`crate::Value`].

use std::fmt;

use ironwood_error::{ModelError, Result};

use crate::Value;

/// A single-character key/value format tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum FormatType {
    /// `b`/`h`/`i`/`l`/`q`: signed integer of 1/2/4/4/8 bytes.
    Signed(u8),
    /// `B`/`H`/`I`/`L`/`Q`: unsigned integer of 1/2/4/4/8 bytes.
    Unsigned(u8),
    /// `r`: fixed-size record number (8 bytes, unsigned).
    RecNo,
    /// `u`: raw byte string.
    Bytes,
    /// `S`: NUL-terminated text string.
    Text,
}

impl FormatType {
    /// Parse a format string.
    ///
    /// Only single-character formats are in scope; multi-character
    /// (struct/compound) formats are rejected as unsupported.
    pub fn parse(format: &str) -> Result<Self> {
        let mut chars = format.chars();
        let (Some(c), None) = (chars.next(), chars.next()) else {
            return Err(ModelError::unsupported(format!(
                "compound format \"{format}\""
            )));
        };
        match c {
            'b' => Ok(Self::Signed(1)),
            'h' => Ok(Self::Signed(2)),
            'i' | 'l' => Ok(Self::Signed(4)),
            'q' => Ok(Self::Signed(8)),
            'B' => Ok(Self::Unsigned(1)),
            'H' => Ok(Self::Unsigned(2)),
            'I' | 'L' => Ok(Self::Unsigned(4)),
            'Q' => Ok(Self::Unsigned(8)),
            'r' => Ok(Self::RecNo),
            'u' => Ok(Self::Bytes),
            'S' => Ok(Self::Text),
            other => Err(ModelError::unsupported(format!("format code '{other}'"))),
        }
    }

    /// Fixed encoded width in bytes, or `None` for variable-width formats.
    #[must_use]
    pub const fn byte_width(self) -> Option<usize> {
        match self {
            Self::Signed(w) | Self::Unsigned(w) => Some(w as usize),
            Self::RecNo => Some(8),
            Self::Bytes | Self::Text => None,
        }
    }

    /// Type-size validation: whether `value` fits this format.
    ///
    /// The absent sentinel is format-free (tombstones carry no payload).
    pub fn check(self, value: &Value) -> Result<()> {
        let fits = match (self, value) {
            (_, Value::Absent) => true,
            (Self::Signed(w), Value::Int(i)) => {
                if w >= 8 {
                    true
                } else {
                    let bits = u32::from(w) * 8;
                    let max = (1_i64 << (bits - 1)) - 1;
                    let min = -(1_i64 << (bits - 1));
                    (min..=max).contains(i)
                }
            }
            (Self::Unsigned(w), Value::UInt(u)) => {
                w >= 8 || *u <= (1_u64 << (u32::from(w) * 8)) - 1
            }
            (Self::RecNo, Value::UInt(_)) => true,
            (Self::Bytes | Self::Text, Value::Text(_)) => true,
            _ => false,
        };
        if fits {
            Ok(())
        } else {
            Err(ModelError::TypeMismatch {
                format: self.code(),
                value: value.to_string(),
            })
        }
    }

    /// The canonical single-character code.
    #[must_use]
    pub const fn code(self) -> char {
        match self {
            Self::Signed(1) => 'b',
            Self::Signed(2) => 'h',
            Self::Signed(4) => 'i',
            Self::Signed(_) => 'q',
            Self::Unsigned(1) => 'B',
            Self::Unsigned(2) => 'H',
            Self::Unsigned(4) => 'I',
            Self::Unsigned(_) => 'Q',
            Self::RecNo => 'r',
            Self::Bytes => 'u',
            Self::Text => 'S',
        }
    }
}

impl fmt::Display for FormatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
