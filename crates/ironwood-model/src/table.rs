//! Tables: ordered key → version-chain maps plus per-transaction write
//! buffers.
//!
//! The chains-map lock is held only long enough to locate or create a
//! chain, then released before the chain is mutated, so concurrent
//! operations on different keys of the same table do not contend. Buffered
//! transactional writes live here (keyed by transaction id) and are never
//! visible to chain readers until the owning transaction publishes them.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use ironwood_error::{ModelError, Result};
use ironwood_types::{FormatType, TableId, Timestamp, TxnId, Value};

use crate::chain::VersionChain;
use crate::txn::Transaction;

/// An ordered map from key to version chain, with the key/value type
/// signature recorded at creation. Iteration order matches the engine's
/// cursor order, which is what the verifier walks.
pub struct Table {
    id: TableId,
    name: String,
    key_format: FormatType,
    value_format: FormatType,
    chains: RwLock<BTreeMap<Value, Arc<VersionChain>>>,
    /// Buffered, not-yet-published writes: txn → key → values in write order.
    pending: Mutex<HashMap<TxnId, BTreeMap<Value, Vec<Value>>>>,
}

impl Table {
    #[must_use]
    pub fn new(id: TableId, name: String, key_format: FormatType, value_format: FormatType) -> Self {
        Self {
            id,
            name,
            key_format,
            value_format,
            chains: RwLock::new(BTreeMap::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn id(&self) -> TableId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn key_format(&self) -> FormatType {
        self.key_format
    }

    #[must_use]
    pub const fn value_format(&self) -> FormatType {
        self.value_format
    }

    fn chain(&self, key: &Value) -> Option<Arc<VersionChain>> {
        self.chains.read().get(key).cloned()
    }

    fn chain_or_create(&self, key: &Value) -> Arc<VersionChain> {
        let mut chains = self.chains.write();
        Arc::clone(chains.entry(key.clone()).or_default())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Committed value visible at `timestamp`.
    #[must_use]
    pub fn get(&self, key: &Value, timestamp: Timestamp) -> Value {
        self.chain(key)
            .map_or(Value::Absent, |chain| chain.read(timestamp))
    }

    /// Read-your-writes: the transaction's own buffered value for `key` if
    /// any, else the committed chain at its read timestamp.
    #[must_use]
    pub fn get_with_txn(&self, key: &Value, txn: &Transaction) -> Value {
        if let Some(buffered) = self
            .pending
            .lock()
            .get(&txn.id())
            .and_then(|keys| keys.get(key))
            .and_then(|values| values.last())
        {
            return buffered.clone();
        }
        self.get(key, txn.effective_read_ts())
    }

    /// Whether any record at the resolved timestamp equals `value`
    /// (commit-timestamp ties are legitimate; see the chain docs).
    #[must_use]
    pub fn contains_any(&self, key: &Value, value: &Value, timestamp: Timestamp) -> bool {
        match self.chain(key) {
            Some(chain) => chain.contains_any(value, timestamp),
            None => value.is_absent(),
        }
    }

    // ------------------------------------------------------------------
    // Direct (non-transactional) writes
    // ------------------------------------------------------------------

    /// Insert outside a transaction; `timestamp` zero means a global write.
    pub fn insert(
        &self,
        key: &Value,
        value: Value,
        timestamp: Timestamp,
        overwrite: bool,
    ) -> Result<()> {
        self.check_types(key, &value)?;
        self.chain_or_create(key)
            .record(key, value, timestamp, timestamp, false, !overwrite)
    }

    /// Update outside a transaction: the key must already be live unless
    /// `overwrite` lifts the precondition.
    pub fn update(
        &self,
        key: &Value,
        value: Value,
        timestamp: Timestamp,
        overwrite: bool,
    ) -> Result<()> {
        self.check_types(key, &value)?;
        self.chain_or_create(key)
            .record(key, value, timestamp, timestamp, !overwrite, false)
    }

    /// Remove outside a transaction (a tombstone write).
    pub fn remove(&self, key: &Value, timestamp: Timestamp, overwrite: bool) -> Result<()> {
        self.key_format.check(key)?;
        self.chain_or_create(key)
            .record(key, Value::Absent, timestamp, timestamp, !overwrite, false)
    }

    // ------------------------------------------------------------------
    // Transactional (buffered) writes
    // ------------------------------------------------------------------

    /// Buffer an insert under `txn`.
    pub fn insert_txn(
        &self,
        key: &Value,
        value: Value,
        txn: &mut Transaction,
        overwrite: bool,
    ) -> Result<()> {
        self.check_types(key, &value)?;
        self.buffer_write(key, value, txn, false, !overwrite)
    }

    /// Buffer an update under `txn`.
    pub fn update_txn(
        &self,
        key: &Value,
        value: Value,
        txn: &mut Transaction,
        overwrite: bool,
    ) -> Result<()> {
        self.check_types(key, &value)?;
        self.buffer_write(key, value, txn, !overwrite, false)
    }

    /// Buffer a remove under `txn`.
    pub fn remove_txn(&self, key: &Value, txn: &mut Transaction, overwrite: bool) -> Result<()> {
        self.key_format.check(key)?;
        self.buffer_write(key, Value::Absent, txn, !overwrite, false)
    }

    /// Buffer a tombstone for every key in `[start, stop]` visible to the
    /// transaction's snapshot. Per-key errors propagate.
    pub fn truncate(&self, start: &Value, stop: &Value, txn: &mut Transaction) -> Result<()> {
        if start > stop {
            return Err(ModelError::internal(format!(
                "truncate range [{start}, {stop}] is inverted"
            )));
        }
        let mut keys: Vec<Value> = self
            .chains
            .read()
            .range(start.clone()..=stop.clone())
            .map(|(k, _)| k.clone())
            .collect();
        if let Some(buffered) = self.pending.lock().get(&txn.id()) {
            for key in buffered
                .range(start.clone()..=stop.clone())
                .map(|(k, _)| k)
            {
                if !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
        }
        keys.sort();

        for key in keys {
            if self.get_with_txn(&key, txn).is_absent() {
                continue;
            }
            self.buffer_write(&key, Value::Absent, txn, false, false)?;
        }
        Ok(())
    }

    /// Buffer one write, enforcing the transaction's write permission and
    /// the must-exist / must-not-exist precondition against the value the
    /// transaction currently sees (its own buffer first, then its
    /// snapshot).
    fn buffer_write(
        &self,
        key: &Value,
        value: Value,
        txn: &mut Transaction,
        must_exist: bool,
        must_not_exist: bool,
    ) -> Result<()> {
        txn.check_can_write()?;

        let current = self.get_with_txn(key, txn);
        if must_exist && current.is_absent() {
            return Err(ModelError::KeyNotFound {
                key: key.to_string(),
            });
        }
        if must_not_exist && !current.is_absent() {
            return Err(ModelError::DuplicateKey {
                key: key.to_string(),
            });
        }

        self.pending
            .lock()
            .entry(txn.id())
            .or_default()
            .entry(key.clone())
            .or_default()
            .push(value);
        txn.note_write(self.id, key.clone());
        Ok(())
    }

    // ------------------------------------------------------------------
    // Commit / rollback plumbing
    // ------------------------------------------------------------------

    /// Stamp and publish the buffered writes for `(txn, key)`.
    ///
    /// Called once per buffered key at commit time; the engine reports its
    /// final commit timestamp only after the operations were issued, so the
    /// buffered values are stamped here, not when they were written.
    pub fn fix_timestamps(
        &self,
        key: &Value,
        txn_id: TxnId,
        commit_ts: Timestamp,
        durable_ts: Timestamp,
    ) -> Result<()> {
        let values = {
            let mut pending = self.pending.lock();
            let Some(keys) = pending.get_mut(&txn_id) else {
                return Err(ModelError::internal(format!(
                    "fix_timestamps: {txn_id} has no buffered writes in {}",
                    self.name
                )));
            };
            let Some(values) = keys.remove(key) else {
                return Err(ModelError::internal(format!(
                    "fix_timestamps: {txn_id} has no buffered writes for key {key}"
                )));
            };
            if keys.is_empty() {
                pending.remove(&txn_id);
            }
            values
        };

        let chain = self.chain_or_create(key);
        for value in values {
            chain.record(key, value, commit_ts, durable_ts, false, false)?;
        }
        tracing::debug!(table = %self.name, %key, %txn_id, %commit_ts, "published buffered writes");
        Ok(())
    }

    /// Discard the buffered writes for `(txn, key)`. No-op against
    /// already-published chains.
    pub fn rollback_updates(&self, key: &Value, txn_id: TxnId) {
        let mut pending = self.pending.lock();
        if let Some(keys) = pending.get_mut(&txn_id) {
            keys.remove(key);
            if keys.is_empty() {
                pending.remove(&txn_id);
            }
        }
    }

    // ------------------------------------------------------------------
    // Whole-table maintenance
    // ------------------------------------------------------------------

    /// Discard published records above `stable` in every chain; returns the
    /// number of records removed. Buffered writes are untouched.
    pub fn rollback_to_stable(&self, stable: Timestamp) -> usize {
        let chains: Vec<Arc<VersionChain>> = self.chains.read().values().cloned().collect();
        chains
            .iter()
            .map(|chain| chain.truncate_newer_than(stable))
            .sum()
    }

    /// The committed view at `timestamp` in key order, omitting keys whose
    /// visible value is absent.
    #[must_use]
    pub fn committed_view(&self, timestamp: Timestamp) -> Vec<(Value, Value)> {
        self.chains_snapshot()
            .into_iter()
            .filter_map(|(key, chain)| {
                let value = chain.read(timestamp);
                (!value.is_absent()).then_some((key, value))
            })
            .collect()
    }

    /// All chains in key order (the verifier walks this lock-step with the
    /// engine cursor).
    #[must_use]
    pub fn chains_snapshot(&self) -> Vec<(Value, Arc<VersionChain>)> {
        self.chains
            .read()
            .iter()
            .map(|(k, c)| (k.clone(), Arc::clone(c)))
            .collect()
    }

    fn check_types(&self, key: &Value, value: &Value) -> Result<()> {
        self.key_format.check(key)?;
        self.value_format.check(value)
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("keys", &self.chains.read().len())
            .finish_non_exhaustive()
    }
}
