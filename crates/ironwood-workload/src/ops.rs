//! The closed workload operation vocabulary and its JSONL wire format.
//!
//! A **workload** is a self-contained, JSONL-serializable description of a
//! run: the header (first line) stamps the seed, RNG, and generator
//! configuration for exact reproducibility; each further line is one
//! operation. The same flat operation sequence is replayed against the
//! reference model and against the production engine, and the two are
//! expected to produce identical success/failure outcomes and identical
//! visible data.
//!
//! There are three exhaustive-match consumers of [`Operation`]: the model
//! replayer, the printer (`Display`), and the CLI. Adding a variant must
//! touch all three, which the compiler enforces.

use std::fmt;

use serde::{Deserialize, Serialize};

use ironwood_types::{FormatType, TableId, Timestamp, TxnId, Value};

use crate::generator::GeneratorConfig;

/// One replayable operation. Every variant carries only the fields needed
/// to replay it; an operation is either transactional (tagged with a
/// transaction id) or standalone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Begin a transaction reading as of `read_ts` (zero reads latest).
    BeginTransaction { txn: TxnId, read_ts: Timestamp },
    /// Two-phase prepare with an intended (not yet final) timestamp.
    PrepareTransaction { txn: TxnId, prepare_ts: Timestamp },
    /// Adjust the intended commit timestamp before commit.
    SetCommitTimestamp { txn: TxnId, commit_ts: Timestamp },
    /// Commit; zero timestamps mean "none given".
    CommitTransaction {
        txn: TxnId,
        commit_ts: Timestamp,
        durable_ts: Timestamp,
    },
    /// Roll back, discarding buffered writes.
    RollbackTransaction { txn: TxnId },
    /// Register a table with its key/value format tags.
    CreateTable {
        table: TableId,
        name: String,
        key_format: FormatType,
        value_format: FormatType,
    },
    /// Point insert; `overwrite` lifts the must-not-exist precondition.
    Insert {
        table: TableId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        txn: Option<TxnId>,
        key: Value,
        value: Value,
        overwrite: bool,
    },
    /// Point remove (a tombstone write); removing a missing key is a
    /// not-found outcome.
    Remove {
        table: TableId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        txn: Option<TxnId>,
        key: Value,
    },
    /// Range truncation under a transaction.
    Truncate {
        table: TableId,
        txn: TxnId,
        start: Value,
        stop: Value,
    },
    /// Named (or default-named, when `None`) checkpoint of committed state.
    Checkpoint {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// Advance the stable timestamp (monotonic).
    SetStableTimestamp { stable_ts: Timestamp },
    /// Discard published history above the stable timestamp.
    RollbackToStable,
    /// Clean restart: in-flight transactions are lost.
    Restart,
    /// Crash and recover: in-flight transactions are lost, then recovery
    /// rolls back to stable.
    Crash,
}

impl Operation {
    /// The owning transaction, if this operation is transactional.
    #[must_use]
    pub fn transaction_id(&self) -> Option<TxnId> {
        match self {
            Self::BeginTransaction { txn, .. }
            | Self::PrepareTransaction { txn, .. }
            | Self::SetCommitTimestamp { txn, .. }
            | Self::CommitTransaction { txn, .. }
            | Self::RollbackTransaction { txn }
            | Self::Truncate { txn, .. } => Some(*txn),
            Self::Insert { txn, .. } | Self::Remove { txn, .. } => *txn,
            Self::CreateTable { .. }
            | Self::Checkpoint { .. }
            | Self::SetStableTimestamp { .. }
            | Self::RollbackToStable
            | Self::Restart
            | Self::Crash => None,
        }
    }

    /// Whether this operation stands alone (no owning transaction).
    #[must_use]
    pub fn is_standalone(&self) -> bool {
        self.transaction_id().is_none()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeginTransaction { txn, read_ts } => {
                write!(f, "begin {txn} read={read_ts}")
            }
            Self::PrepareTransaction { txn, prepare_ts } => {
                write!(f, "prepare {txn} at {prepare_ts}")
            }
            Self::SetCommitTimestamp { txn, commit_ts } => {
                write!(f, "set-commit {txn} to {commit_ts}")
            }
            Self::CommitTransaction {
                txn,
                commit_ts,
                durable_ts,
            } => write!(f, "commit {txn} commit={commit_ts} durable={durable_ts}"),
            Self::RollbackTransaction { txn } => write!(f, "rollback {txn}"),
            Self::CreateTable {
                table,
                name,
                key_format,
                value_format,
            } => write!(f, "create {table} \"{name}\" ({key_format} -> {value_format})"),
            Self::Insert {
                table,
                txn,
                key,
                value,
                overwrite,
            } => match txn {
                Some(txn) => write!(f, "insert {table} {txn} {key}={value} overwrite={overwrite}"),
                None => write!(f, "insert {table} global {key}={value} overwrite={overwrite}"),
            },
            Self::Remove { table, txn, key } => match txn {
                Some(txn) => write!(f, "remove {table} {txn} {key}"),
                None => write!(f, "remove {table} global {key}"),
            },
            Self::Truncate {
                table,
                txn,
                start,
                stop,
            } => write!(f, "truncate {table} {txn} [{start}, {stop}]"),
            Self::Checkpoint { name } => match name {
                Some(name) => write!(f, "checkpoint \"{name}\""),
                None => write!(f, "checkpoint"),
            },
            Self::SetStableTimestamp { stable_ts } => write!(f, "set-stable {stable_ts}"),
            Self::RollbackToStable => write!(f, "rollback-to-stable"),
            Self::Restart => write!(f, "restart"),
            Self::Crash => write!(f, "crash"),
        }
    }
}

/// RNG algorithm and version tag stamped into the header for exact
/// reproducibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngSpec {
    pub algorithm: String,
    pub version: String,
}

impl Default for RngSpec {
    fn default() -> Self {
        Self {
            algorithm: "StdRng/ChaCha12".to_owned(),
            version: "rand 0.8".to_owned(),
        }
    }
}

/// Metadata header; always the first JSONL line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadHeader {
    pub seed: u64,
    pub rng: RngSpec,
    pub config: GeneratorConfig,
}

/// A complete workload: header plus the flat, ordered operation sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    pub header: WorkloadHeader,
    pub ops: Vec<Operation>,
}

impl Workload {
    /// Serialize to JSONL (header line, then one operation per line).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        let mut out = serde_json::to_string(&self.header)?;
        out.push('\n');
        for op in &self.ops {
            out.push_str(&serde_json::to_string(op)?);
            out.push('\n');
        }
        Ok(out)
    }

    /// Deserialize from JSONL text.
    pub fn from_jsonl(text: &str) -> Result<Self, serde_json::Error> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let header_line = lines.next().unwrap_or("{}");
        let header: WorkloadHeader = serde_json::from_str(header_line)?;
        let mut ops = Vec::new();
        for line in lines {
            ops.push(serde_json::from_str(line)?);
        }
        Ok(Self { header, ops })
    }
}
