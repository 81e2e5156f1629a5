//! Per-key version chains.
//!
//! A chain is the committed history of one key: version records sorted
//! ascending by timestamp (ties keep insertion order). Readers resolve the
//! greatest recorded timestamp at or below their query timestamp.

use parking_lot::Mutex;

use ironwood_error::{ModelError, Result};
use ironwood_types::{Timestamp, Value};

/// One committed write: a value and the timestamp at which it becomes
/// visible. `durable` equals `timestamp` except for prepared-transaction
/// commits, where the engine reports a separate durable timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord {
    pub value: Value,
    pub timestamp: Timestamp,
    pub durable: Timestamp,
}

/// Lock-protected, timestamp-ordered version history for one key.
///
/// A key is either "always timestamped" or "always global" at any point in
/// its history: appending a global (no-timestamp) record to a chain whose
/// last record is timestamped fails, and vice versa.
#[derive(Debug, Default)]
pub struct VersionChain {
    records: Mutex<Vec<VersionRecord>>,
}

impl VersionChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, keeping timestamp order.
    ///
    /// `key` is used for diagnostics only. With `must_exist`, the
    /// immediately preceding entry in sorted position must exist and be
    /// non-absent; with `must_not_exist`, it must be missing or absent.
    /// The preceding-entry rule is deliberate: it is NOT the same as
    /// resolving the visible value when several records share a timestamp.
    pub fn record(
        &self,
        key: &Value,
        value: Value,
        timestamp: Timestamp,
        durable: Timestamp,
        must_exist: bool,
        must_not_exist: bool,
    ) -> Result<()> {
        let mut records = self.records.lock();

        if let Some(last) = records.last() {
            if last.timestamp.is_none() != timestamp.is_none() {
                return Err(ModelError::TimestampMode {
                    key: key.to_string(),
                });
            }
        }

        let pos = records.partition_point(|r| r.timestamp <= timestamp);
        let preceding = pos.checked_sub(1).map(|i| &records[i]);

        if must_exist && !preceding.is_some_and(|r| !r.value.is_absent()) {
            return Err(ModelError::KeyNotFound {
                key: key.to_string(),
            });
        }
        if must_not_exist && preceding.is_some_and(|r| !r.value.is_absent()) {
            return Err(ModelError::DuplicateKey {
                key: key.to_string(),
            });
        }

        records.insert(
            pos,
            VersionRecord {
                value,
                timestamp,
                durable,
            },
        );
        Ok(())
    }

    /// Resolve the value visible at `timestamp`: the record with the
    /// greatest recorded timestamp at or below the query, or `Absent` if
    /// none exists (a tombstone reads as `Absent` too).
    ///
    /// When several records share the resolved timestamp this returns one
    /// representative (the last inserted); use [`Self::contains_any`] when
    /// a tie must be tolerated.
    #[must_use]
    pub fn read(&self, timestamp: Timestamp) -> Value {
        let records = self.records.lock();
        let pos = records.partition_point(|r| r.timestamp <= timestamp);
        match pos.checked_sub(1) {
            Some(i) => records[i].value.clone(),
            None => Value::Absent,
        }
    }

    /// Whether any record at exactly the resolved timestamp equals `value`.
    ///
    /// Concurrent commits may legitimately tie on timestamp, and a reader
    /// of the production engine may observe any one of them; `read` only
    /// returns a single representative.
    #[must_use]
    pub fn contains_any(&self, value: &Value, timestamp: Timestamp) -> bool {
        let records = self.records.lock();
        let pos = records.partition_point(|r| r.timestamp <= timestamp);
        let Some(last) = pos.checked_sub(1) else {
            return value.is_absent();
        };
        let resolved = records[last].timestamp;
        records[..pos]
            .iter()
            .rev()
            .take_while(|r| r.timestamp == resolved)
            .any(|r| r.value == *value)
    }

    /// Discard records with a timestamp strictly greater than `stable`.
    ///
    /// Records at exactly the stable timestamp are kept. Global (ts-zero)
    /// records are never discarded. Returns the number removed.
    pub fn truncate_newer_than(&self, stable: Timestamp) -> usize {
        let mut records = self.records.lock();
        let before = records.len();
        records.retain(|r| r.timestamp <= stable);
        before - records.len()
    }

    /// Number of records in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Clone of the full history, oldest first (dump/debug use).
    #[must_use]
    pub fn history(&self) -> Vec<VersionRecord> {
        self.records.lock().clone()
    }
}
