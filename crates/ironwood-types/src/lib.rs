//! Foundation types for the ironwood reference model.
//!
//! Identifier newtypes live here; [`Value`] and the engine format tags are
//! in their own modules. Components refer to tables and transactions by
//! these integer ids; the database instance is the sole owner of the
//! underlying objects.

use std::fmt;

pub mod format;
pub mod value;

pub use format::FormatType;
pub use value::Value;

/// A point on the global timestamp axis.
///
/// Zero means "no timestamp": the write is globally visible immediately,
/// independent of any reader's timestamp. The maximum value means
/// "as of now / latest".
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The "no timestamp" sentinel: a global, immediately-visible write.
    pub const NONE: Self = Self(0);

    /// The "latest" sentinel: reads as of now.
    pub const MAX: Self = Self(u64::MAX);

    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Whether this is the "no timestamp" sentinel.
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "ts:none")
        } else if self.0 == u64::MAX {
            write!(f, "ts:max")
        } else {
            write!(f, "ts:{}", self.0)
        }
    }
}

/// Identifier of a table within one database instance.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(transparent)]
pub struct TableId(u32);

impl TableId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table#{}", self.0)
    }
}

/// Identifier of a transaction within one database instance.
///
/// Ids start at 1; zero is never handed out, so a raw zero in decoded
/// input always means "no transaction".
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(transparent)]
pub struct TxnId(u64);

impl TxnId {
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_sentinels() {
        assert!(Timestamp::NONE.is_none());
        assert!(!Timestamp::new(1).is_none());
        assert_eq!(Timestamp::MAX.get(), u64::MAX);
        assert!(Timestamp::NONE < Timestamp::new(1));
        assert!(Timestamp::new(1) < Timestamp::MAX);
    }

    #[test]
    fn timestamp_display() {
        assert_eq!(Timestamp::NONE.to_string(), "ts:none");
        assert_eq!(Timestamp::new(42).to_string(), "ts:42");
        assert_eq!(Timestamp::MAX.to_string(), "ts:max");
    }

    #[test]
    fn ids_display() {
        assert_eq!(TableId::new(3).to_string(), "table#3");
        assert_eq!(TxnId::new(7).to_string(), "txn#7");
    }

    #[test]
    fn timestamp_serde_is_transparent() {
        let json = serde_json::to_string(&Timestamp::new(9)).unwrap();
        assert_eq!(json, "9");
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Timestamp::new(9));
    }
}
