//! Transaction state machine.
//!
//! `Active → Prepared → {Committed | Aborted}` and `Active → {Committed |
//! Aborted}`; `Prepared → Active` is not legal, and terminal states refuse
//! everything. Writes buffer while active and are stamped/published only at
//! commit; the production engine reports its final commit timestamp after
//! the operations were issued, so buffered writes are re-stamped, never
//! written pre-stamped.

use ironwood_error::{ModelError, Result};
use ironwood_types::{TableId, Timestamp, TxnId, Value};

/// Lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxnState {
    Active,
    Prepared,
    Committed,
    Aborted,
}

impl TxnState {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Prepared => "prepared",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
        }
    }

    /// Whether the transaction has reached a terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }
}

/// Commit/durable timestamps as resolved by [`Transaction::begin_commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitStamps {
    pub commit: Timestamp,
    pub durable: Timestamp,
}

/// A running transaction.
///
/// Owned by the database's active registry; everything else refers to it by
/// id. The write set records, in first-touch order, which `(table, key)`
/// pairs hold buffered writes (the buffers themselves live with the tables).
#[derive(Debug)]
pub struct Transaction {
    id: TxnId,
    state: TxnState,
    read_ts: Timestamp,
    prepare_ts: Timestamp,
    commit_ts: Timestamp,
    durable_ts: Timestamp,
    write_set: Vec<(TableId, Value)>,
}

impl Transaction {
    #[must_use]
    pub fn new(id: TxnId, read_ts: Timestamp) -> Self {
        tracing::debug!(txn = %id, read_ts = %read_ts, "transaction begun");
        Self {
            id,
            state: TxnState::Active,
            read_ts,
            prepare_ts: Timestamp::NONE,
            commit_ts: Timestamp::NONE,
            durable_ts: Timestamp::NONE,
            write_set: Vec::new(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> TxnId {
        self.id
    }

    #[must_use]
    pub const fn state(&self) -> TxnState {
        self.state
    }

    /// The read timestamp, with the "no timestamp" sentinel resolved to
    /// "latest": a transaction without a read timestamp sees everything
    /// committed.
    #[must_use]
    pub const fn effective_read_ts(&self) -> Timestamp {
        if self.read_ts.is_none() {
            Timestamp::MAX
        } else {
            self.read_ts
        }
    }

    #[must_use]
    pub const fn prepare_ts(&self) -> Timestamp {
        self.prepare_ts
    }

    #[must_use]
    pub const fn commit_ts(&self) -> Timestamp {
        self.commit_ts
    }

    #[must_use]
    pub const fn durable_ts(&self) -> Timestamp {
        self.durable_ts
    }

    #[must_use]
    pub fn write_set(&self) -> &[(TableId, Value)] {
        &self.write_set
    }

    fn expect_state(&self, expected: TxnState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.wrong_state(expected.name()))
        }
    }

    fn wrong_state(&self, expected: &'static str) -> ModelError {
        ModelError::InvalidTransactionState {
            id: self.id.get(),
            expected,
            actual: self.state.name(),
        }
    }

    /// Whether this transaction may buffer a write right now.
    ///
    /// Only active transactions buffer; a prepared transaction refuses
    /// further writes.
    pub fn check_can_write(&self) -> Result<()> {
        match self.state {
            TxnState::Active => Ok(()),
            TxnState::Prepared => Err(ModelError::WriteAfterPrepare { id: self.id.get() }),
            _ => Err(self.wrong_state("active")),
        }
    }

    /// Note a buffered write to `(table, key)` (first touch only).
    pub(crate) fn note_write(&mut self, table: TableId, key: Value) {
        if !self
            .write_set
            .iter()
            .any(|(t, k)| *t == table && *k == key)
        {
            self.write_set.push((table, key));
        }
    }

    /// `active → prepared`, recording the prepare timestamp.
    pub fn prepare(&mut self, ts: Timestamp) -> Result<()> {
        self.expect_state(TxnState::Active)?;
        self.state = TxnState::Prepared;
        self.prepare_ts = ts;
        tracing::debug!(txn = %self.id, prepare_ts = %ts, "transaction prepared");
        Ok(())
    }

    /// Record the intended commit timestamp; legal while active or
    /// prepared, and later calls overwrite earlier ones.
    pub fn set_commit_timestamp(&mut self, ts: Timestamp) -> Result<()> {
        match self.state {
            TxnState::Active | TxnState::Prepared => {
                self.commit_ts = ts;
                Ok(())
            }
            _ => Err(self.wrong_state("active or prepared")),
        }
    }

    /// Validate and resolve the final commit/durable stamps, take the
    /// write set for publishing, and transition to committed.
    ///
    /// Prepared commits require `prepare < commit <= durable`. A commit
    /// without any timestamp publishes globally (no-timestamp writes).
    pub fn begin_commit(
        &mut self,
        commit_ts: Option<Timestamp>,
        durable_ts: Option<Timestamp>,
    ) -> Result<(CommitStamps, Vec<(TableId, Value)>)> {
        let was_prepared = match self.state {
            TxnState::Active => false,
            TxnState::Prepared => true,
            _ => return Err(self.wrong_state("active or prepared")),
        };

        let commit = commit_ts.unwrap_or(self.commit_ts);
        let durable = durable_ts.unwrap_or(commit);

        if was_prepared {
            if commit <= self.prepare_ts {
                return Err(ModelError::TimestampOrder {
                    id: self.id.get(),
                    detail: format!(
                        "commit {commit} must be greater than prepare {}",
                        self.prepare_ts
                    ),
                });
            }
            if durable < commit {
                return Err(ModelError::TimestampOrder {
                    id: self.id.get(),
                    detail: format!("durable {durable} must be at least commit {commit}"),
                });
            }
        }

        self.commit_ts = commit;
        self.durable_ts = if was_prepared { durable } else { commit };
        self.state = TxnState::Committed;
        tracing::debug!(
            txn = %self.id,
            commit_ts = %self.commit_ts,
            durable_ts = %self.durable_ts,
            "transaction committed"
        );
        Ok((
            CommitStamps {
                commit: self.commit_ts,
                durable: self.durable_ts,
            },
            std::mem::take(&mut self.write_set),
        ))
    }

    /// Take the write set for discarding and transition to aborted.
    pub fn begin_rollback(&mut self) -> Result<Vec<(TableId, Value)>> {
        match self.state {
            TxnState::Active | TxnState::Prepared => {}
            _ => return Err(self.wrong_state("active or prepared")),
        }
        self.state = TxnState::Aborted;
        tracing::debug!(txn = %self.id, "transaction rolled back");
        Ok(std::mem::take(&mut self.write_set))
    }
}
