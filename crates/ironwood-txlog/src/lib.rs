//! Decode a structured write-ahead-log record stream into the workload
//! operation vocabulary.
//!
//! The log-ingestion component (external to this repository) converts the
//! engine's on-disk log into a JSONL stream of three record kinds:
//!
//! - **metadata**: establishes a table (file identifier, name, key/value
//!   format tags) or a column-group-to-table association;
//! - **data**: one put/remove with a file identifier and raw encoded
//!   key/value bytes, decoded per the owning table's format tag;
//! - **timestamp**: commit/durable/prepare timestamps applied to the
//!   currently-open transaction.
//!
//! A transaction's records are contiguous in the stream; a record for a
//! different transaction closes the open one. Record shapes outside the
//! model's scope (struct-typed formats, column-store tables, LSM objects)
//! are rejected as unsupported rather than silently ignored, except for a
//! short explicit allow-list of bookkeeping markers that are skipped.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use ironwood_error::{ModelError, Result};
use ironwood_types::{FormatType, TableId, Timestamp, TxnId, Value};
use ironwood_workload::Operation;

/// Bookkeeping markers that are intentionally skipped.
const SKIPPED_MARKERS: &[&str] = &["system", "file_sync", "prev_lsn", "noop"];

/// One record of the structured log stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogRecord {
    /// Table registration or column-group association.
    Metadata {
        file_id: u32,
        /// `table:<name>`, `colgroup:<table name>`, or an unsupported
        /// object class such as `lsm:<name>`.
        uri: String,
        key_format: String,
        value_format: String,
    },
    /// One write. `txn` zero means a non-transactional write.
    Data {
        file_id: u32,
        txn: u64,
        op: DataOp,
        key: Vec<u8>,
        #[serde(default)]
        value: Vec<u8>,
    },
    /// Timestamps for the currently-open transaction; zero fields are
    /// "not carried".
    Timestamp {
        txn: u64,
        #[serde(default)]
        commit_ts: u64,
        #[serde(default)]
        durable_ts: u64,
        #[serde(default)]
        prepare_ts: u64,
    },
    /// A bookkeeping marker; only allow-listed names may appear.
    Marker { name: String },
}

/// The write kind of a data record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataOp {
    Put,
    Remove,
}

#[derive(Debug, Clone)]
struct TableEntry {
    table: TableId,
    key_format: FormatType,
    value_format: FormatType,
}

#[derive(Debug)]
struct OpenTxn {
    id: TxnId,
    commit_ts: Timestamp,
    durable_ts: Timestamp,
    prepare_ts: Timestamp,
}

/// Streaming decoder: push records (or JSONL lines), then [`finish`].
///
/// [`finish`]: LogDecoder::finish
#[derive(Debug, Default)]
pub struct LogDecoder {
    /// file id → owning table (column groups alias their table's entry).
    files: HashMap<u32, TableEntry>,
    names: HashMap<String, TableEntry>,
    open: Option<OpenTxn>,
    ops: Vec<Operation>,
}

impl LogDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a whole JSONL stream in one call.
    pub fn decode_stream(text: &str) -> Result<Vec<Operation>> {
        let mut decoder = Self::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            decoder.push_line(line)?;
        }
        decoder.finish()
    }

    /// Parse and push one JSONL line.
    pub fn push_line(&mut self, line: &str) -> Result<()> {
        let record: LogRecord = serde_json::from_str(line)
            .map_err(|err| ModelError::unsupported(format!("log record shape: {err}")))?;
        self.push(record)
    }

    /// Push one record.
    pub fn push(&mut self, record: LogRecord) -> Result<()> {
        match record {
            LogRecord::Metadata {
                file_id,
                uri,
                key_format,
                value_format,
            } => self.push_metadata(file_id, &uri, &key_format, &value_format),
            LogRecord::Data {
                file_id,
                txn,
                op,
                key,
                value,
            } => self.push_data(file_id, txn, op, &key, &value),
            LogRecord::Timestamp {
                txn,
                commit_ts,
                durable_ts,
                prepare_ts,
            } => self.push_timestamp(txn, commit_ts, durable_ts, prepare_ts),
            LogRecord::Marker { name } => {
                if SKIPPED_MARKERS.contains(&name.as_str()) {
                    tracing::debug!(marker = name, "skipping bookkeeping marker");
                    Ok(())
                } else {
                    Err(ModelError::unsupported(format!("log marker \"{name}\"")))
                }
            }
        }
    }

    /// Close any open transaction and return the decoded operations.
    pub fn finish(mut self) -> Result<Vec<Operation>> {
        self.close_open_txn();
        Ok(self.ops)
    }

    fn push_metadata(
        &mut self,
        file_id: u32,
        uri: &str,
        key_format: &str,
        value_format: &str,
    ) -> Result<()> {
        if let Some(name) = uri.strip_prefix("table:") {
            let key_format = FormatType::parse(key_format)?;
            let value_format = FormatType::parse(value_format)?;
            if key_format == FormatType::RecNo {
                // Record-number keys mean a column-store table.
                return Err(ModelError::unsupported(format!(
                    "column-store table \"{name}\""
                )));
            }
            let entry = TableEntry {
                table: TableId::new(file_id),
                key_format,
                value_format,
            };
            self.ops.push(Operation::CreateTable {
                table: entry.table,
                name: name.to_owned(),
                key_format,
                value_format,
            });
            self.files.insert(file_id, entry.clone());
            self.names.insert(name.to_owned(), entry);
            Ok(())
        } else if let Some(name) = uri.strip_prefix("colgroup:") {
            let entry = self
                .names
                .get(name)
                .cloned()
                .ok_or_else(|| ModelError::TableNotFound {
                    name: name.to_owned(),
                })?;
            self.files.insert(file_id, entry);
            Ok(())
        } else {
            // lsm:, tiered:, index:, ...: outside the model's scope.
            Err(ModelError::unsupported(format!("log object \"{uri}\"")))
        }
    }

    fn push_data(
        &mut self,
        file_id: u32,
        txn: u64,
        op: DataOp,
        key: &[u8],
        value: &[u8],
    ) -> Result<()> {
        let entry = self
            .files
            .get(&file_id)
            .cloned()
            .ok_or(ModelError::TableIdNotFound { id: file_id })?;

        let txn = self.switch_txn(txn);
        let key = decode_packed(entry.key_format, key)?;
        match op {
            DataOp::Put => {
                let value = decode_packed(entry.value_format, value)?;
                self.ops.push(Operation::Insert {
                    table: entry.table,
                    txn,
                    key,
                    value,
                    overwrite: true,
                });
            }
            DataOp::Remove => {
                self.ops.push(Operation::Remove {
                    table: entry.table,
                    txn,
                    key,
                });
            }
        }
        Ok(())
    }

    fn push_timestamp(
        &mut self,
        txn: u64,
        commit_ts: u64,
        durable_ts: u64,
        prepare_ts: u64,
    ) -> Result<()> {
        self.switch_txn(txn);
        let Some(open) = self.open.as_mut() else {
            return Err(ModelError::internal(
                "timestamp record with no open transaction",
            ));
        };
        if commit_ts != 0 {
            open.commit_ts = Timestamp::new(commit_ts);
        }
        if durable_ts != 0 {
            open.durable_ts = Timestamp::new(durable_ts);
        }
        if prepare_ts != 0 {
            open.prepare_ts = Timestamp::new(prepare_ts);
        }
        Ok(())
    }

    /// Make `txn` the open transaction, closing a different open one.
    /// Zero means non-transactional and leaves nothing open.
    fn switch_txn(&mut self, txn: u64) -> Option<TxnId> {
        if txn == 0 {
            self.close_open_txn();
            return None;
        }
        let id = TxnId::new(txn);
        if self.open.as_ref().is_some_and(|open| open.id == id) {
            return Some(id);
        }
        self.close_open_txn();
        self.ops.push(Operation::BeginTransaction {
            txn: id,
            read_ts: Timestamp::NONE,
        });
        self.open = Some(OpenTxn {
            id,
            commit_ts: Timestamp::NONE,
            durable_ts: Timestamp::NONE,
            prepare_ts: Timestamp::NONE,
        });
        Some(id)
    }

    /// Emit the prepare/commit tail for the open transaction, if any.
    ///
    /// The log only carries committed work, so every group closes with a
    /// commit at the recorded timestamps.
    fn close_open_txn(&mut self) {
        let Some(open) = self.open.take() else {
            return;
        };
        if !open.prepare_ts.is_none() {
            self.ops.push(Operation::PrepareTransaction {
                txn: open.id,
                prepare_ts: open.prepare_ts,
            });
        }
        let durable_ts = if open.durable_ts.is_none() {
            open.commit_ts
        } else {
            open.durable_ts
        };
        self.ops.push(Operation::CommitTransaction {
            txn: open.id,
            commit_ts: open.commit_ts,
            durable_ts,
        });
    }
}

/// Decode a raw engine-encoded scalar per the table's format tag.
///
/// Fixed-width integers are big-endian; text is NUL-terminated UTF-8; raw
/// byte strings are carried as (lossy) text.
fn decode_packed(format: FormatType, bytes: &[u8]) -> Result<Value> {
    let fixed = |width: usize| -> Result<u64> {
        if bytes.len() != width {
            return Err(ModelError::unsupported(format!(
                "{}-byte payload for format '{}'",
                bytes.len(),
                format.code()
            )));
        }
        let mut raw = 0_u64;
        for &b in bytes {
            raw = (raw << 8) | u64::from(b);
        }
        Ok(raw)
    };

    match format {
        FormatType::Signed(w) => {
            let raw = fixed(w as usize)?;
            let bits = u32::from(w) * 8;
            // Sign-extend from the declared width.
            let shifted = (raw as i64) << (64 - bits) >> (64 - bits);
            Ok(Value::Int(shifted))
        }
        FormatType::Unsigned(w) => Ok(Value::UInt(fixed(w as usize)?)),
        FormatType::RecNo => Ok(Value::UInt(fixed(8)?)),
        FormatType::Text => {
            let stripped = bytes.strip_suffix(&[0]).unwrap_or(bytes);
            Ok(Value::Text(String::from_utf8_lossy(stripped).into_owned()))
        }
        FormatType::Bytes => Ok(Value::Text(String::from_utf8_lossy(bytes).into_owned())),
    }
}
