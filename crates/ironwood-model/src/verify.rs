//! Verification: diff a live engine cursor against the model.
//!
//! The engine stays a black box: its forward cursor is abstracted as an
//! iterator of `(key, value)` pairs in key order. The model side walks its
//! latest committed view, skipping tombstoned entries, and the first
//! divergence is reported with the offending key.

use std::fmt;

use ironwood_types::{Timestamp, Value};

use crate::table::Table;

/// A verification mismatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyFailure {
    pub table: String,
    pub key: Option<Value>,
    pub detail: String,
}

impl fmt::Display for VerifyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "table {}: key {}: {}", self.table, key, self.detail),
            None => write!(f, "table {}: {}", self.table, self.detail),
        }
    }
}

impl std::error::Error for VerifyFailure {}

/// Walk `cursor` lock-step with the model table's latest committed view.
///
/// At each step the cursor's key must equal the model's key and the
/// cursor's value must match *some* record at the resolved timestamp
/// (`contains_any`; concurrent commits may tie on timestamp and the
/// engine may expose any one of them). Either side running out before the
/// other is a failure.
pub fn verify_table<I>(table: &Table, cursor: I) -> Result<(), VerifyFailure>
where
    I: IntoIterator<Item = (Value, Value)>,
{
    let mut cursor = cursor.into_iter();
    let fail = |key: Option<Value>, detail: String| VerifyFailure {
        table: table.name().to_owned(),
        key,
        detail,
    };

    for (model_key, chain) in table.chains_snapshot() {
        if chain.read(Timestamp::MAX).is_absent() {
            continue; // tombstoned: the engine cursor must not surface it
        }

        let Some((cursor_key, cursor_value)) = cursor.next() else {
            return Err(fail(
                Some(model_key),
                "engine cursor ended before the model's view".to_owned(),
            ));
        };

        if cursor_key != model_key {
            return Err(fail(
                Some(model_key.clone()),
                format!("engine cursor is at key {cursor_key}, model expects {model_key}"),
            ));
        }

        if !chain.contains_any(&cursor_value, Timestamp::MAX) {
            return Err(fail(
                Some(model_key),
                format!(
                    "engine value {cursor_value} matches no model record (model reads {})",
                    chain.read(Timestamp::MAX)
                ),
            ));
        }
    }

    if let Some((extra_key, _)) = cursor.next() {
        return Err(fail(
            Some(extra_key.clone()),
            format!("engine cursor has extra key {extra_key} past the model's view"),
        ));
    }

    Ok(())
}
