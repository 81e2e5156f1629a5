//! Replay a flat workload against the reference model.
//!
//! `NotFound` and `DuplicateKey` are ordinary, data-dependent outcomes:
//! real workloads are expected to trigger them, and an engine-side executor
//! compares them 1:1 against the engine's return codes. Everything else
//! (invalid state, unsupported constructs, broken invariants) aborts the
//! run with the offending operation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use ironwood_error::{ModelError, Result};
use ironwood_model::Database;
use ironwood_types::{TableId, Timestamp, TxnId};

use crate::ops::Operation;

/// Per-operation outcome, comparable against the production engine's
/// return code for the same operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpOutcome {
    Ok,
    NotFound,
    DuplicateKey,
}

/// Outcome of replaying one workload against the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    /// One outcome per operation, in workload order.
    pub outcomes: Vec<OpOutcome>,
}

impl ReplayReport {
    /// Number of operations that did not return `Ok`.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| !matches!(o, OpOutcome::Ok))
            .count()
    }
}

/// Replays operations against a model database, mapping the workload's
/// table/transaction ids onto the ids the database hands out.
pub struct Replayer<'a> {
    db: &'a Database,
    tables: HashMap<TableId, TableId>,
    txns: HashMap<TxnId, TxnId>,
}

impl<'a> Replayer<'a> {
    #[must_use]
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            tables: HashMap::new(),
            txns: HashMap::new(),
        }
    }

    /// Apply every operation in order; fatal errors carry the offending
    /// operation's position and rendering.
    pub fn replay(&mut self, ops: &[Operation]) -> Result<ReplayReport> {
        let mut outcomes = Vec::with_capacity(ops.len());
        for (pos, op) in ops.iter().enumerate() {
            match self.apply(op) {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) if err.is_data_outcome() => outcomes.push(match err.code() {
                    ironwood_error::ErrorCode::DuplicateKey => OpOutcome::DuplicateKey,
                    _ => OpOutcome::NotFound,
                }),
                Err(err) => {
                    tracing::warn!(%err, pos, op = %op, "fatal error during replay");
                    return Err(ModelError::internal(format!(
                        "replay failed at operation {pos} ({op}): {err}"
                    )));
                }
            }
        }
        Ok(ReplayReport { outcomes })
    }

    fn table(&self, id: TableId) -> Result<TableId> {
        self.tables
            .get(&id)
            .copied()
            .ok_or(ModelError::TableIdNotFound { id: id.get() })
    }

    fn txn(&self, id: TxnId) -> Result<TxnId> {
        self.txns
            .get(&id)
            .copied()
            .ok_or(ModelError::TransactionNotFound { id: id.get() })
    }

    fn none_to_opt(ts: Timestamp) -> Option<Timestamp> {
        if ts.is_none() { None } else { Some(ts) }
    }

    /// The single exhaustive dispatch over the operation vocabulary.
    fn apply(&mut self, op: &Operation) -> Result<OpOutcome> {
        match op {
            Operation::BeginTransaction { txn, read_ts } => {
                let model_id = self.db.begin_transaction(*read_ts);
                self.txns.insert(*txn, model_id);
                Ok(OpOutcome::Ok)
            }
            Operation::PrepareTransaction { txn, prepare_ts } => {
                self.db.prepare_transaction(self.txn(*txn)?, *prepare_ts)?;
                Ok(OpOutcome::Ok)
            }
            Operation::SetCommitTimestamp { txn, commit_ts } => {
                self.db.set_commit_timestamp(self.txn(*txn)?, *commit_ts)?;
                Ok(OpOutcome::Ok)
            }
            Operation::CommitTransaction {
                txn,
                commit_ts,
                durable_ts,
            } => {
                self.db.commit_transaction(
                    self.txn(*txn)?,
                    Self::none_to_opt(*commit_ts),
                    Self::none_to_opt(*durable_ts),
                )?;
                self.txns.remove(txn);
                Ok(OpOutcome::Ok)
            }
            Operation::RollbackTransaction { txn } => {
                self.db.rollback_transaction(self.txn(*txn)?)?;
                self.txns.remove(txn);
                Ok(OpOutcome::Ok)
            }
            Operation::CreateTable {
                table,
                name,
                key_format,
                value_format,
            } => {
                let model_id = self.db.create_table(name, *key_format, *value_format)?;
                self.tables.insert(*table, model_id);
                Ok(OpOutcome::Ok)
            }
            Operation::Insert {
                table,
                txn,
                key,
                value,
                overwrite,
            } => {
                let table = self.table(*table)?;
                let txn = txn.map(|id| self.txn(id)).transpose()?;
                self.db
                    .insert(table, txn, key, value.clone(), Timestamp::NONE, *overwrite)?;
                Ok(OpOutcome::Ok)
            }
            Operation::Remove { table, txn, key } => {
                let table = self.table(*table)?;
                let txn = txn.map(|id| self.txn(id)).transpose()?;
                self.db.remove(table, txn, key, Timestamp::NONE, false)?;
                Ok(OpOutcome::Ok)
            }
            Operation::Truncate {
                table,
                txn,
                start,
                stop,
            } => {
                self.db
                    .truncate(self.table(*table)?, self.txn(*txn)?, start, stop)?;
                Ok(OpOutcome::Ok)
            }
            Operation::Checkpoint { name } => {
                self.db.checkpoint(name.as_deref())?;
                Ok(OpOutcome::Ok)
            }
            Operation::SetStableTimestamp { stable_ts } => {
                self.db.set_stable_timestamp(*stable_ts);
                Ok(OpOutcome::Ok)
            }
            Operation::RollbackToStable => {
                self.db.rollback_to_stable();
                Ok(OpOutcome::Ok)
            }
            Operation::Restart => {
                self.db.restart()?;
                self.txns.clear();
                Ok(OpOutcome::Ok)
            }
            Operation::Crash => {
                self.db.crash()?;
                self.txns.clear();
                Ok(OpOutcome::Ok)
            }
        }
    }
}

/// Convenience wrapper: replay `ops` against `db`.
pub fn replay(db: &Database, ops: &[Operation]) -> Result<ReplayReport> {
    Replayer::new(db).replay(ops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironwood_types::{FormatType, Value};

    fn create_op(table: u32) -> Operation {
        Operation::CreateTable {
            table: TableId::new(table),
            name: format!("table{table}"),
            key_format: FormatType::Unsigned(8),
            value_format: FormatType::Text,
        }
    }

    #[test]
    fn replays_transactional_flow() {
        let db = Database::new();
        let txn = TxnId::new(1);
        let ops = vec![
            create_op(1),
            Operation::BeginTransaction {
                txn,
                read_ts: Timestamp::NONE,
            },
            Operation::Insert {
                table: TableId::new(1),
                txn: Some(txn),
                key: Value::UInt(1),
                value: "v".into(),
                overwrite: false,
            },
            Operation::CommitTransaction {
                txn,
                commit_ts: Timestamp::new(10),
                durable_ts: Timestamp::new(10),
            },
        ];
        let report = replay(&db, &ops).unwrap();
        assert_eq!(report.failure_count(), 0);

        let table = db.table_by_name("table1").unwrap();
        assert_eq!(table.get(&Value::UInt(1), Timestamp::MAX), "v".into());
    }

    #[test]
    fn data_outcomes_are_recorded_not_fatal() {
        let db = Database::new();
        let ops = vec![
            create_op(1),
            // Remove of a missing key is a not-found outcome.
            Operation::Remove {
                table: TableId::new(1),
                txn: None,
                key: Value::UInt(9),
            },
            // Global duplicate insert.
            Operation::Insert {
                table: TableId::new(1),
                txn: None,
                key: Value::UInt(1),
                value: "a".into(),
                overwrite: false,
            },
            Operation::Insert {
                table: TableId::new(1),
                txn: None,
                key: Value::UInt(1),
                value: "b".into(),
                overwrite: false,
            },
        ];
        let report = replay(&db, &ops).unwrap();
        assert_eq!(
            report.outcomes,
            vec![
                OpOutcome::Ok,
                OpOutcome::NotFound,
                OpOutcome::Ok,
                OpOutcome::DuplicateKey,
            ]
        );
        assert_eq!(report.failure_count(), 2);
    }

    #[test]
    fn fatal_errors_abort_with_position() {
        let db = Database::new();
        let txn = TxnId::new(1);
        let ops = vec![
            Operation::BeginTransaction {
                txn,
                read_ts: Timestamp::NONE,
            },
            Operation::PrepareTransaction {
                txn,
                prepare_ts: Timestamp::new(5),
            },
            // Second prepare is an invalid state transition.
            Operation::PrepareTransaction {
                txn,
                prepare_ts: Timestamp::new(6),
            },
        ];
        let err = replay(&db, &ops).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("operation 2"));
    }

    #[test]
    fn restart_clears_transaction_mapping() {
        let db = Database::new();
        let txn = TxnId::new(1);
        let ops = vec![
            create_op(1),
            Operation::BeginTransaction {
                txn,
                read_ts: Timestamp::NONE,
            },
            Operation::Insert {
                table: TableId::new(1),
                txn: Some(txn),
                key: Value::UInt(1),
                value: "lost".into(),
                overwrite: true,
            },
            Operation::Restart,
        ];
        let report = replay(&db, &ops).unwrap();
        assert_eq!(report.failure_count(), 0);
        assert!(db.active_transactions().is_empty());
        let table = db.table_by_name("table1").unwrap();
        assert_eq!(table.get(&Value::UInt(1), Timestamp::MAX), Value::Absent);
    }

    #[test]
    fn crash_recovers_to_stable() {
        let db = Database::new();
        let ops = vec![
            create_op(1),
            Operation::Insert {
                table: TableId::new(1),
                txn: None,
                key: Value::UInt(1),
                value: "keep".into(),
                overwrite: true,
            },
            Operation::SetStableTimestamp {
                stable_ts: Timestamp::new(5),
            },
            Operation::Crash,
        ];
        // The global insert survives: global records sit below any stable
        // timestamp.
        let report = replay(&db, &ops).unwrap();
        assert_eq!(report.failure_count(), 0);
        let table = db.table_by_name("table1").unwrap();
        assert_eq!(table.get(&Value::UInt(1), Timestamp::MAX), "keep".into());
    }
}
