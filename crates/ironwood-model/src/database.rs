//! The database instance: registries, checkpoints, stable timestamp.
//!
//! Owns every table, active transaction, and checkpoint; everything else
//! refers to them by id or name. Each registry sits behind its own lock;
//! there is no global lock serializing unrelated tables or keys, and no
//! ambient static state: the instance is passed explicitly wherever needed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use ironwood_error::{ModelError, Result};
use ironwood_types::{FormatType, TableId, Timestamp, TxnId, Value};

use crate::table::Table;
use crate::txn::{Transaction, TxnState};

/// Name under which an unnamed checkpoint is registered.
pub const DEFAULT_CHECKPOINT_NAME: &str = "checkpoint";

/// A named, durable, point-in-time view of committed state.
///
/// Materialized at creation from the chains only; no in-flight
/// transaction's buffered writes can leak in.
#[derive(Debug)]
pub struct Checkpoint {
    name: String,
    boundary: Timestamp,
    tables: BTreeMap<TableId, BTreeMap<Value, Value>>,
}

impl Checkpoint {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The timestamp boundary the checkpoint was taken at (the stable
    /// timestamp when one was set, else "latest").
    #[must_use]
    pub const fn boundary(&self) -> Timestamp {
        self.boundary
    }

    /// Value of `key` in `table` as of this checkpoint.
    #[must_use]
    pub fn get(&self, table: TableId, key: &Value) -> Value {
        self.tables
            .get(&table)
            .and_then(|keys| keys.get(key))
            .cloned()
            .unwrap_or(Value::Absent)
    }

    /// The checkpointed view of one table in key order.
    #[must_use]
    pub fn table_view(&self, table: TableId) -> Vec<(Value, Value)> {
        self.tables
            .get(&table)
            .map(|keys| keys.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }
}

/// The reference model's database instance.
pub struct Database {
    tables: RwLock<BTreeMap<TableId, Arc<Table>>>,
    table_names: RwLock<HashMap<String, TableId>>,
    txns: RwLock<HashMap<TxnId, Arc<Mutex<Transaction>>>>,
    checkpoints: RwLock<BTreeMap<String, Arc<Checkpoint>>>,
    stable: Mutex<Timestamp>,
    next_table_id: AtomicU32,
    next_txn_id: AtomicU64,
}

impl Database {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(BTreeMap::new()),
            table_names: RwLock::new(HashMap::new()),
            txns: RwLock::new(HashMap::new()),
            checkpoints: RwLock::new(BTreeMap::new()),
            stable: Mutex::new(Timestamp::NONE),
            next_table_id: AtomicU32::new(1),
            next_txn_id: AtomicU64::new(1),
        }
    }

    // ------------------------------------------------------------------
    // Tables
    // ------------------------------------------------------------------

    /// Register a new table. The database assigns and owns the id.
    pub fn create_table(
        &self,
        name: &str,
        key_format: FormatType,
        value_format: FormatType,
    ) -> Result<TableId> {
        let mut names = self.table_names.write();
        if names.contains_key(name) {
            return Err(ModelError::TableExists {
                name: name.to_owned(),
            });
        }
        let id = TableId::new(self.next_table_id.fetch_add(1, Ordering::Relaxed));
        names.insert(name.to_owned(), id);
        drop(names);

        let table = Arc::new(Table::new(id, name.to_owned(), key_format, value_format));
        self.tables.write().insert(id, table);
        tracing::debug!(table = name, %id, "table created");
        Ok(id)
    }

    /// Look up a table by id.
    pub fn table(&self, id: TableId) -> Result<Arc<Table>> {
        self.tables
            .read()
            .get(&id)
            .cloned()
            .ok_or(ModelError::TableIdNotFound { id: id.get() })
    }

    /// Look up a table by name.
    pub fn table_by_name(&self, name: &str) -> Result<Arc<Table>> {
        let id = self
            .table_names
            .read()
            .get(name)
            .copied()
            .ok_or_else(|| ModelError::TableNotFound {
                name: name.to_owned(),
            })?;
        self.table(id)
    }

    /// All table ids in creation order.
    #[must_use]
    pub fn table_ids(&self) -> Vec<TableId> {
        self.tables.read().keys().copied().collect()
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Admit a new transaction reading as of `read_ts` (the no-timestamp
    /// sentinel reads latest).
    pub fn begin_transaction(&self, read_ts: Timestamp) -> TxnId {
        let id = TxnId::new(self.next_txn_id.fetch_add(1, Ordering::Relaxed));
        let txn = Arc::new(Mutex::new(Transaction::new(id, read_ts)));
        self.txns.write().insert(id, txn);
        id
    }

    fn txn_handle(&self, id: TxnId) -> Result<Arc<Mutex<Transaction>>> {
        self.txns
            .read()
            .get(&id)
            .cloned()
            .ok_or(ModelError::TransactionNotFound { id: id.get() })
    }

    /// Current lifecycle state of an active transaction.
    pub fn transaction_state(&self, id: TxnId) -> Result<TxnState> {
        Ok(self.txn_handle(id)?.lock().state())
    }

    /// Ids of all transactions still in the active registry, ascending.
    #[must_use]
    pub fn active_transactions(&self) -> Vec<TxnId> {
        let mut ids: Vec<TxnId> = self.txns.read().keys().copied().collect();
        ids.sort();
        ids
    }

    /// `active → prepared`, recording the prepare timestamp.
    pub fn prepare_transaction(&self, id: TxnId, prepare_ts: Timestamp) -> Result<()> {
        self.txn_handle(id)?.lock().prepare(prepare_ts)
    }

    /// Adjust the intended commit timestamp of an active or prepared
    /// transaction; later calls overwrite earlier ones.
    pub fn set_commit_timestamp(&self, id: TxnId, commit_ts: Timestamp) -> Result<()> {
        self.txn_handle(id)?.lock().set_commit_timestamp(commit_ts)
    }

    /// Commit: stamp every buffered write with the final commit/durable
    /// timestamps, publish them, and retire the transaction.
    pub fn commit_transaction(
        &self,
        id: TxnId,
        commit_ts: Option<Timestamp>,
        durable_ts: Option<Timestamp>,
    ) -> Result<()> {
        let handle = self.txn_handle(id)?;
        let mut txn = handle.lock();
        let (stamps, write_set) = txn.begin_commit(commit_ts, durable_ts)?;
        drop(txn);

        for (table_id, key) in write_set {
            self.table(table_id)?
                .fix_timestamps(&key, id, stamps.commit, stamps.durable)?;
        }
        self.txns.write().remove(&id);
        Ok(())
    }

    /// Roll back: discard every buffered write and retire the transaction.
    pub fn rollback_transaction(&self, id: TxnId) -> Result<()> {
        let handle = self.txn_handle(id)?;
        let write_set = handle.lock().begin_rollback()?;

        for (table_id, key) in write_set {
            self.table(table_id)?.rollback_updates(&key, id);
        }
        self.txns.write().remove(&id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Point operations (resolved by id)
    // ------------------------------------------------------------------

    /// Insert; buffered when `txn` is given, otherwise applied at `ts`
    /// (zero = global).
    pub fn insert(
        &self,
        table: TableId,
        txn: Option<TxnId>,
        key: &Value,
        value: Value,
        ts: Timestamp,
        overwrite: bool,
    ) -> Result<()> {
        let table = self.table(table)?;
        match txn {
            Some(id) => {
                let handle = self.txn_handle(id)?;
                let r = table.insert_txn(key, value, &mut handle.lock(), overwrite);
                r
            }
            None => table.insert(key, value, ts, overwrite),
        }
    }

    /// Remove; buffered when `txn` is given.
    pub fn remove(
        &self,
        table: TableId,
        txn: Option<TxnId>,
        key: &Value,
        ts: Timestamp,
        overwrite: bool,
    ) -> Result<()> {
        let table = self.table(table)?;
        match txn {
            Some(id) => {
                let handle = self.txn_handle(id)?;
                let r = table.remove_txn(key, &mut handle.lock(), overwrite);
                r
            }
            None => table.remove(key, ts, overwrite),
        }
    }

    /// Truncate `[start, stop]` under a transaction.
    pub fn truncate(
        &self,
        table: TableId,
        txn: TxnId,
        start: &Value,
        stop: &Value,
    ) -> Result<()> {
        let table = self.table(table)?;
        let handle = self.txn_handle(txn)?;
        let r = table.truncate(start, stop, &mut handle.lock());
        r
    }

    /// Committed read at a timestamp.
    pub fn get(&self, table: TableId, key: &Value, ts: Timestamp) -> Result<Value> {
        Ok(self.table(table)?.get(key, ts))
    }

    /// Read through a transaction (read-your-writes, then its snapshot).
    pub fn get_txn(&self, table: TableId, txn: TxnId, key: &Value) -> Result<Value> {
        let table = self.table(table)?;
        let handle = self.txn_handle(txn)?;
        let txn = handle.lock();
        Ok(table.get_with_txn(key, &txn))
    }

    /// Read as of a named checkpoint.
    pub fn get_checkpoint(&self, table: TableId, name: &str, key: &Value) -> Result<Value> {
        let ckpt = self.checkpoint_by_name(name)?;
        Ok(ckpt.get(table, key))
    }

    // ------------------------------------------------------------------
    // Checkpoints / stable timestamp / recovery
    // ------------------------------------------------------------------

    /// Create a checkpoint of the currently committed state. `None` uses
    /// the default name; an existing name (default included) fails.
    pub fn checkpoint(&self, name: Option<&str>) -> Result<()> {
        let name = name.unwrap_or(DEFAULT_CHECKPOINT_NAME);
        let mut checkpoints = self.checkpoints.write();
        if checkpoints.contains_key(name) {
            return Err(ModelError::CheckpointExists {
                name: name.to_owned(),
            });
        }

        let stable = *self.stable.lock();
        let boundary = if stable.is_none() {
            Timestamp::MAX
        } else {
            stable
        };

        let tables = self
            .tables
            .read()
            .iter()
            .map(|(id, table)| (*id, table.committed_view(boundary).into_iter().collect()))
            .collect();

        checkpoints.insert(
            name.to_owned(),
            Arc::new(Checkpoint {
                name: name.to_owned(),
                boundary,
                tables,
            }),
        );
        tracing::debug!(checkpoint = name, %boundary, "checkpoint created");
        Ok(())
    }

    /// Look up a checkpoint by name.
    pub fn checkpoint_by_name(&self, name: &str) -> Result<Arc<Checkpoint>> {
        self.checkpoints
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ModelError::CheckpointNotFound {
                name: name.to_owned(),
            })
    }

    /// Advance the stable timestamp. Monotonic: a smaller value than the
    /// current one is ignored, never an error.
    pub fn set_stable_timestamp(&self, ts: Timestamp) {
        let mut stable = self.stable.lock();
        if ts > *stable {
            *stable = ts;
        }
    }

    /// The current stable timestamp.
    #[must_use]
    pub fn stable_timestamp(&self) -> Timestamp {
        *self.stable.lock()
    }

    /// Discard published history above the stable timestamp in every
    /// table. In-flight transactions are untouched; this operates purely
    /// on already-published records.
    pub fn rollback_to_stable(&self) -> usize {
        let stable = *self.stable.lock();
        let tables: Vec<Arc<Table>> = self.tables.read().values().cloned().collect();
        let removed: usize = tables
            .iter()
            .map(|table| table.rollback_to_stable(stable))
            .sum();
        tracing::debug!(%stable, removed, "rolled back to stable");
        removed
    }

    /// Clean restart: in-flight transactions are lost (rolled back);
    /// committed state survives.
    pub fn restart(&self) -> Result<()> {
        for id in self.active_transactions() {
            self.rollback_transaction(id)?;
        }
        tracing::debug!("restart: in-flight transactions abandoned");
        Ok(())
    }

    /// Crash and recover: in-flight transactions are lost, then recovery
    /// rolls back to the stable timestamp.
    pub fn crash(&self) -> Result<()> {
        self.restart()?;
        self.rollback_to_stable();
        Ok(())
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("tables", &self.tables.read().len())
            .field("active_txns", &self.txns.read().len())
            .field("checkpoints", &self.checkpoints.read().len())
            .field("stable", &*self.stable.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironwood_error::ErrorCode;

    fn db_with_table() -> (Database, TableId) {
        let db = Database::new();
        let id = db
            .create_table("t0", FormatType::Unsigned(8), FormatType::Text)
            .unwrap();
        (db, id)
    }

    fn ts(raw: u64) -> Timestamp {
        Timestamp::new(raw)
    }

    #[test]
    fn create_table_twice_fails() {
        let (db, _) = db_with_table();
        let err = db
            .create_table("t0", FormatType::Unsigned(8), FormatType::Text)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateKey);
        db.create_table("t1", FormatType::Unsigned(8), FormatType::Text)
            .unwrap();
    }

    #[test]
    fn missing_lookups() {
        let db = Database::new();
        assert_eq!(
            db.table(TableId::new(9)).unwrap_err().code(),
            ErrorCode::NotFound
        );
        assert_eq!(
            db.table_by_name("nope").unwrap_err().code(),
            ErrorCode::NotFound
        );
        assert_eq!(
            db.transaction_state(TxnId::new(9)).unwrap_err().code(),
            ErrorCode::NotFound
        );
        assert_eq!(
            db.checkpoint_by_name("nope").unwrap_err().code(),
            ErrorCode::NotFound
        );
    }

    #[test]
    fn transaction_commit_publishes_atomically() {
        let (db, t) = db_with_table();
        let txn = db.begin_transaction(Timestamp::NONE);
        db.insert(t, Some(txn), &Value::UInt(1), "a".into(), Timestamp::NONE, false)
            .unwrap();
        db.insert(t, Some(txn), &Value::UInt(2), "b".into(), Timestamp::NONE, false)
            .unwrap();

        assert_eq!(db.get(t, &Value::UInt(1), Timestamp::MAX).unwrap(), Value::Absent);

        db.commit_transaction(txn, Some(ts(10)), None).unwrap();
        assert_eq!(db.get(t, &Value::UInt(1), ts(10)).unwrap(), "a".into());
        assert_eq!(db.get(t, &Value::UInt(2), ts(10)).unwrap(), "b".into());
        assert!(db.active_transactions().is_empty());

        // Terminal: the id no longer resolves.
        assert_eq!(
            db.commit_transaction(txn, Some(ts(11)), None)
                .unwrap_err()
                .code(),
            ErrorCode::NotFound
        );
    }

    #[test]
    fn rollback_discards_buffered_writes() {
        let (db, t) = db_with_table();
        let txn = db.begin_transaction(Timestamp::NONE);
        db.insert(t, Some(txn), &Value::UInt(1), "a".into(), Timestamp::NONE, false)
            .unwrap();
        db.rollback_transaction(txn).unwrap();
        assert_eq!(db.get(t, &Value::UInt(1), Timestamp::MAX).unwrap(), Value::Absent);
        assert!(db.active_transactions().is_empty());
    }

    #[test]
    fn prepared_transaction_visibility() {
        let (db, t) = db_with_table();
        let txn = db.begin_transaction(Timestamp::NONE);
        db.insert(t, Some(txn), &Value::UInt(5), "R".into(), Timestamp::NONE, false)
            .unwrap();
        db.prepare_transaction(txn, ts(50)).unwrap();
        assert_eq!(db.transaction_state(txn).unwrap(), TxnState::Prepared);

        // Writes are refused after prepare.
        let err = db
            .insert(t, Some(txn), &Value::UInt(6), "S".into(), Timestamp::NONE, false)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidState);

        db.commit_transaction(txn, Some(ts(60)), Some(ts(70))).unwrap();
        assert_eq!(db.get(t, &Value::UInt(5), ts(55)).unwrap(), Value::Absent);
        assert_eq!(db.get(t, &Value::UInt(5), ts(65)).unwrap(), "R".into());
    }

    #[test]
    fn stable_timestamp_is_monotonic() {
        let db = Database::new();
        db.set_stable_timestamp(ts(10));
        db.set_stable_timestamp(ts(5));
        assert_eq!(db.stable_timestamp(), ts(10));
        db.set_stable_timestamp(ts(20));
        assert_eq!(db.stable_timestamp(), ts(20));
    }

    #[test]
    fn rollback_to_stable_is_idempotent() {
        let (db, t) = db_with_table();
        db.insert(t, None, &Value::UInt(1), "old".into(), ts(10), false)
            .unwrap();
        db.insert(t, None, &Value::UInt(1), "mid".into(), ts(20), true)
            .unwrap();
        db.insert(t, None, &Value::UInt(1), "new".into(), ts(30), true)
            .unwrap();

        db.set_stable_timestamp(ts(20));
        db.rollback_to_stable();
        assert_eq!(db.get(t, &Value::UInt(1), Timestamp::MAX).unwrap(), "mid".into());

        db.rollback_to_stable();
        assert_eq!(
            db.get(t, &Value::UInt(1), Timestamp::MAX).unwrap(),
            "mid".into(),
            "second application changes nothing"
        );
    }

    #[test]
    fn rollback_to_stable_boundary_inclusive() {
        let (db, t) = db_with_table();
        db.insert(t, None, &Value::UInt(1), "at".into(), ts(20), false)
            .unwrap();
        db.set_stable_timestamp(ts(20));
        db.rollback_to_stable();
        assert_eq!(
            db.get(t, &Value::UInt(1), Timestamp::MAX).unwrap(),
            "at".into(),
            "record at exactly the stable timestamp is kept"
        );
    }

    #[test]
    fn rollback_to_stable_skips_in_flight() {
        let (db, t) = db_with_table();
        db.set_stable_timestamp(ts(10));
        let txn = db.begin_transaction(Timestamp::NONE);
        db.insert(t, Some(txn), &Value::UInt(1), "buffered".into(), Timestamp::NONE, false)
            .unwrap();
        db.rollback_to_stable();
        // The buffer survives and can still commit.
        db.commit_transaction(txn, Some(ts(30)), None).unwrap();
        assert_eq!(db.get(t, &Value::UInt(1), ts(30)).unwrap(), "buffered".into());
    }

    #[test]
    fn checkpoint_excludes_uncommitted_and_is_named() {
        let (db, t) = db_with_table();
        db.insert(t, None, &Value::UInt(1), "committed".into(), ts(10), false)
            .unwrap();
        let txn = db.begin_transaction(Timestamp::NONE);
        db.insert(t, Some(txn), &Value::UInt(2), "buffered".into(), Timestamp::NONE, false)
            .unwrap();

        db.checkpoint(Some("snap")).unwrap();
        assert_eq!(
            db.get_checkpoint(t, "snap", &Value::UInt(1)).unwrap(),
            "committed".into()
        );
        assert_eq!(
            db.get_checkpoint(t, "snap", &Value::UInt(2)).unwrap(),
            Value::Absent,
            "in-flight buffers never reach a checkpoint"
        );

        let err = db.checkpoint(Some("snap")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateKey);
        db.rollback_transaction(txn).unwrap();
    }

    #[test]
    fn unnamed_checkpoint_uses_default_name() {
        let (db, _) = db_with_table();
        db.checkpoint(None).unwrap();
        assert!(db.checkpoint_by_name(DEFAULT_CHECKPOINT_NAME).is_ok());
        let err = db.checkpoint(None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateKey);
    }

    #[test]
    fn checkpoint_respects_stable_boundary() {
        let (db, t) = db_with_table();
        db.insert(t, None, &Value::UInt(1), "old".into(), ts(10), false)
            .unwrap();
        db.insert(t, None, &Value::UInt(1), "new".into(), ts(30), true)
            .unwrap();
        db.set_stable_timestamp(ts(20));
        db.checkpoint(Some("at-stable")).unwrap();
        assert_eq!(
            db.get_checkpoint(t, "at-stable", &Value::UInt(1)).unwrap(),
            "old".into(),
            "checkpoint resolves at the stable boundary"
        );
        // Later history is untouched by checkpointing.
        assert_eq!(db.get(t, &Value::UInt(1), ts(30)).unwrap(), "new".into());
    }

    #[test]
    fn restart_abandons_in_flight_keeps_committed() {
        let (db, t) = db_with_table();
        db.insert(t, None, &Value::UInt(1), "durable".into(), ts(40), false)
            .unwrap();
        let txn = db.begin_transaction(Timestamp::NONE);
        db.insert(t, Some(txn), &Value::UInt(2), "lost".into(), Timestamp::NONE, false)
            .unwrap();

        db.restart().unwrap();
        assert!(db.active_transactions().is_empty());
        assert_eq!(db.get(t, &Value::UInt(1), Timestamp::MAX).unwrap(), "durable".into());
        assert_eq!(db.get(t, &Value::UInt(2), Timestamp::MAX).unwrap(), Value::Absent);
    }

    #[test]
    fn crash_runs_recovery_to_stable() {
        let (db, t) = db_with_table();
        db.insert(t, None, &Value::UInt(1), "stable".into(), ts(10), false)
            .unwrap();
        db.insert(t, None, &Value::UInt(1), "volatile".into(), ts(30), true)
            .unwrap();
        db.set_stable_timestamp(ts(10));

        db.crash().unwrap();
        assert_eq!(
            db.get(t, &Value::UInt(1), Timestamp::MAX).unwrap(),
            "stable".into()
        );
    }
}
