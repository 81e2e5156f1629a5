//! Randomized workload generation.
//!
//! Generation is a seeded, single-threaded batch computation in four
//! passes:
//!
//! 1. **Synthesis**: weighted draws build transaction and standalone
//!    sequences with placeholder timestamps.
//! 2. **Dependency graph**: overlapping key ranges on the same table and
//!    standalone barriers become "first finishes before second starts"
//!    edges.
//! 3. **Timestamp assignment**: a frontier bounded by the next barrier's
//!    index hands out stamps from a bounded, monotonically advancing
//!    window.
//! 4. **Interleaving**: up to `max_concurrent_transactions` runnable
//!    sequences are drained uniformly at random into one flat workload;
//!    a restart abandons everything begun but unfinished.
//!
//! Table setup (DDL) is emitted ahead of the interleaved operations and is
//! not counted against the sequence budget. Drawing from an empty
//! probability table or advancing an exhausted sequence is an
//! unrecoverable internal error; the generator is a batch tool, not a
//! long-running service.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use ironwood_error::{ModelError, Result};
use ironwood_types::{FormatType, TableId, Timestamp, TxnId, Value};

use crate::ops::{Operation, RngSpec, Workload, WorkloadHeader};
use crate::sequence::{Sequence, SequenceKind, add_edge};

/// Hard cap on the body length of one transaction, so a finish weight of
/// zero cannot loop forever.
const MAX_TXN_BODY_OPS: usize = 64;

/// Weights for the looped draws inside a transaction sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationWeights {
    pub insert: u32,
    pub remove: u32,
    pub truncate: u32,
    pub set_commit_timestamp: u32,
    pub finish: u32,
}

impl Default for OperationWeights {
    fn default() -> Self {
        Self {
            insert: 50,
            remove: 15,
            truncate: 5,
            set_commit_timestamp: 8,
            finish: 22,
        }
    }
}

/// Weights for standalone (barrier) sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandaloneWeights {
    pub checkpoint: u32,
    pub restart: u32,
    pub set_stable_timestamp: u32,
}

impl Default for StandaloneWeights {
    fn default() -> Self {
        Self {
            checkpoint: 40,
            restart: 20,
            set_stable_timestamp: 40,
        }
    }
}

/// Generator configuration; echoed verbatim into the workload header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Master seed; per-pass streams are derived from it.
    pub seed: u64,
    /// Number of sequences to synthesize (table setup not counted).
    pub sequence_count: usize,
    /// Number of tables created up front.
    pub table_count: usize,
    /// Percent chance a slot becomes a standalone (barrier) sequence.
    pub standalone_percent: u32,
    /// Percent of transactions that go through two-phase prepare.
    pub prepared_percent: u32,
    /// Percent of transactions that end in rollback.
    pub rollback_percent: u32,
    /// Cap on concurrently-running sequences during interleaving.
    pub max_concurrent_transactions: usize,
    /// Keys are drawn from `0..key_domain`.
    pub key_domain: u64,
    /// The advancing timestamp window moves by `1..=max_timestamp_step`.
    pub max_timestamp_step: u64,
    pub weights: OperationWeights,
    pub standalone_weights: StandaloneWeights,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            sequence_count: 50,
            table_count: 2,
            standalone_percent: 12,
            prepared_percent: 20,
            rollback_percent: 15,
            max_concurrent_transactions: 4,
            key_domain: 1_000,
            max_timestamp_step: 5,
            weights: OperationWeights::default(),
            standalone_weights: StandaloneWeights::default(),
        }
    }
}

impl GeneratorConfig {
    /// The table ids this configuration creates during setup.
    fn table_ids(&self) -> impl Iterator<Item = TableId> + '_ {
        (0..self.table_count).map(|t| TableId::new(u32::try_from(t + 1).unwrap_or(u32::MAX)))
    }
}

/// Generate a complete workload from `config`.
///
/// Deterministic: the same configuration (seed included) produces a
/// byte-identical workload.
pub fn generate(config: GeneratorConfig) -> Result<Workload> {
    let mut generator = Generator::new(config.clone());
    let mut sequences = generator.synthesize()?;
    build_dependencies(&mut sequences);
    generator.assign_timestamps(&mut sequences)?;

    // Table setup runs ahead of the interleaved data operations.
    let mut ops: Vec<Operation> = config
        .table_ids()
        .map(|table| Operation::CreateTable {
            table,
            name: format!("table{}", table.get()),
            key_format: FormatType::Unsigned(8),
            value_format: FormatType::Text,
        })
        .collect();
    ops.extend(generator.interleave(&sequences)?);

    tracing::debug!(ops = ops.len(), seed = config.seed, "workload generated");
    Ok(Workload {
        header: WorkloadHeader {
            seed: config.seed,
            rng: RngSpec::default(),
            config,
        },
        ops,
    })
}

/// Pass 2: derive the dependency graph.
///
/// Overlapping key ranges on the same table serialize the two sequences
/// (the later one would otherwise hit an ambiguous write-conflict outcome
/// in the real engine). Every standalone sequence depends on all sequences
/// generated since the previous standalone one, forming ordered timestamp
/// barriers; sequences generated after a barrier are held behind it only
/// during timestamp assignment, so they can legitimately be in flight when
/// a restart executes.
pub fn build_dependencies(sequences: &mut [Sequence]) {
    let n = sequences.len();

    for second in 0..n {
        for first in 0..second {
            if sequences[first].overlaps(&sequences[second]) {
                add_edge(sequences, first, second);
            }
        }
    }

    let mut window_start = 0;
    for barrier in 0..n {
        if !sequences[barrier].is_standalone() {
            continue;
        }
        for i in window_start..barrier {
            add_edge(sequences, i, barrier);
        }
        window_start = barrier + 1;
    }
}

/// SplitMix64-style mixing; deterministic and cheap.
fn derive_stream_seed(seed: u64, stream: u64) -> u64 {
    let mut x = seed ^ (stream << 1);
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Weighted draw over `entries`; an all-zero table is an internal error.
fn weighted_draw<T: Copy>(rng: &mut StdRng, entries: &[(T, u32)]) -> Result<T> {
    let total: u32 = entries.iter().map(|(_, w)| *w).sum();
    if total == 0 {
        return Err(ModelError::internal("empty probability table"));
    }
    let mut x = rng.gen_range(0..total);
    for (item, weight) in entries {
        if x < *weight {
            return Ok(*item);
        }
        x -= weight;
    }
    Err(ModelError::internal("weighted draw out of range"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyOp {
    Insert,
    Remove,
    Truncate,
    SetCommitTimestamp,
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StandaloneOp {
    Checkpoint,
    Restart,
    SetStableTimestamp,
}

struct Generator {
    cfg: GeneratorConfig,
    synth_rng: StdRng,
    stamp_rng: StdRng,
    schedule_rng: StdRng,
    next_txn: u64,
    next_checkpoint: u64,
    /// Last handed-out timestamp (the advancing window's watermark).
    clock: u64,
}

impl Generator {
    fn new(cfg: GeneratorConfig) -> Self {
        let seed = cfg.seed;
        Self {
            cfg,
            synth_rng: StdRng::seed_from_u64(derive_stream_seed(seed, 1)),
            stamp_rng: StdRng::seed_from_u64(derive_stream_seed(seed, 2)),
            schedule_rng: StdRng::seed_from_u64(derive_stream_seed(seed, 3)),
            next_txn: 1,
            next_checkpoint: 1,
            clock: 0,
        }
    }

    // ------------------------------------------------------------------
    // Pass 1: synthesis
    // ------------------------------------------------------------------

    fn synthesize(&mut self) -> Result<Vec<Sequence>> {
        let mut sequences = Vec::with_capacity(self.cfg.sequence_count);
        for index in 0..self.cfg.sequence_count {
            let standalone = self.synth_rng.gen_range(0..100) < self.cfg.standalone_percent;
            let seq = if standalone {
                self.synth_standalone(index)?
            } else {
                self.synth_transaction(index)?
            };
            sequences.push(seq);
        }
        Ok(sequences)
    }

    fn synth_standalone(&mut self, index: usize) -> Result<Sequence> {
        let w = self.cfg.standalone_weights;
        let kind = weighted_draw(
            &mut self.synth_rng,
            &[
                (StandaloneOp::Checkpoint, w.checkpoint),
                (StandaloneOp::Restart, w.restart),
                (StandaloneOp::SetStableTimestamp, w.set_stable_timestamp),
            ],
        )?;
        let op = match kind {
            StandaloneOp::Checkpoint => {
                let name = format!("ckpt-{}", self.next_checkpoint);
                self.next_checkpoint += 1;
                Operation::Checkpoint { name: Some(name) }
            }
            StandaloneOp::Restart => Operation::Restart,
            StandaloneOp::SetStableTimestamp => Operation::SetStableTimestamp {
                stable_ts: Timestamp::NONE,
            },
        };
        Ok(Sequence::new(index, SequenceKind::Standalone, vec![op]))
    }

    fn synth_transaction(&mut self, index: usize) -> Result<Sequence> {
        let txn = TxnId::new(self.next_txn);
        self.next_txn += 1;
        let table = TableId::new(
            u32::try_from(self.synth_rng.gen_range(0..self.cfg.table_count.max(1)) + 1)
                .unwrap_or(1),
        );
        let prepared = self.synth_rng.gen_range(0..100) < self.cfg.prepared_percent;

        let mut ops = vec![Operation::BeginTransaction {
            txn,
            read_ts: Timestamp::NONE,
        }];
        let mut key_range: Option<(u64, u64)> = None;
        let mut touch = |range: &mut Option<(u64, u64)>, lo: u64, hi: u64| {
            *range = Some(match range {
                Some((cur_lo, cur_hi)) => ((*cur_lo).min(lo), (*cur_hi).max(hi)),
                None => (lo, hi),
            });
        };

        let w = self.cfg.weights;
        let body_weights = [
            (BodyOp::Insert, w.insert),
            (BodyOp::Remove, w.remove),
            (BodyOp::Truncate, w.truncate),
            // Prepared transactions take their commit timestamp at commit.
            (
                BodyOp::SetCommitTimestamp,
                if prepared { 0 } else { w.set_commit_timestamp },
            ),
            (BodyOp::Finish, w.finish),
        ];

        for _ in 0..MAX_TXN_BODY_OPS {
            match weighted_draw(&mut self.synth_rng, &body_weights)? {
                BodyOp::Insert => {
                    let key = self.synth_rng.gen_range(0..self.cfg.key_domain);
                    touch(&mut key_range, key, key);
                    let value = self.gen_text();
                    let overwrite = self.synth_rng.gen_bool(0.8);
                    ops.push(Operation::Insert {
                        table,
                        txn: Some(txn),
                        key: Value::UInt(key),
                        value: Value::Text(value),
                        overwrite,
                    });
                }
                BodyOp::Remove => {
                    let key = self.synth_rng.gen_range(0..self.cfg.key_domain);
                    touch(&mut key_range, key, key);
                    ops.push(Operation::Remove {
                        table,
                        txn: Some(txn),
                        key: Value::UInt(key),
                    });
                }
                BodyOp::Truncate => {
                    let start = self.synth_rng.gen_range(0..self.cfg.key_domain);
                    let span = self.synth_rng.gen_range(0..=16);
                    let stop = start.saturating_add(span).min(self.cfg.key_domain - 1);
                    touch(&mut key_range, start, stop);
                    ops.push(Operation::Truncate {
                        table,
                        txn,
                        start: Value::UInt(start),
                        stop: Value::UInt(stop),
                    });
                }
                BodyOp::SetCommitTimestamp => {
                    ops.push(Operation::SetCommitTimestamp {
                        txn,
                        commit_ts: Timestamp::NONE,
                    });
                }
                BodyOp::Finish => break,
            }
        }

        // Resolve the finish: commit, rollback, or a prepared variant.
        let rollback = self.synth_rng.gen_range(0..100) < self.cfg.rollback_percent;
        if prepared {
            if rollback && self.synth_rng.gen_bool(0.5) {
                // Rollback before ever preparing.
                ops.push(Operation::RollbackTransaction { txn });
            } else {
                ops.push(Operation::PrepareTransaction {
                    txn,
                    prepare_ts: Timestamp::NONE,
                });
                if rollback {
                    ops.push(Operation::RollbackTransaction { txn });
                } else {
                    ops.push(Operation::CommitTransaction {
                        txn,
                        commit_ts: Timestamp::NONE,
                        durable_ts: Timestamp::NONE,
                    });
                }
            }
        } else if rollback {
            ops.push(Operation::RollbackTransaction { txn });
        } else {
            ops.push(Operation::CommitTransaction {
                txn,
                commit_ts: Timestamp::NONE,
                durable_ts: Timestamp::NONE,
            });
        }

        Ok(Sequence::new(
            index,
            SequenceKind::Transaction {
                txn,
                table,
                key_range,
                prepared,
            },
            ops,
        ))
    }

    fn gen_text(&mut self) -> String {
        let len = self.synth_rng.gen_range(1..=16);
        (0..len)
            .map(|_| (b'a' + self.synth_rng.gen_range(0..26)) as char)
            .collect()
    }

    // ------------------------------------------------------------------
    // Pass 3: timestamp assignment
    // ------------------------------------------------------------------

    fn next_stamp(&mut self) -> Timestamp {
        self.clock += self
            .stamp_rng
            .gen_range(1..=self.cfg.max_timestamp_step.max(1));
        Timestamp::new(self.clock)
    }

    fn assign_timestamps(&mut self, sequences: &mut [Sequence]) -> Result<()> {
        let n = sequences.len();
        let mut indeg: Vec<usize> = sequences.iter().map(|s| s.depends_on.len()).collect();
        let mut finished = vec![false; n];
        let barriers: Vec<usize> = sequences
            .iter()
            .filter(|s| s.is_standalone())
            .map(|s| s.index)
            .collect();

        for _ in 0..n {
            // The frontier is bounded by the next unfinished barrier: a
            // sequence generated after it must not receive timestamps yet.
            let next_barrier = barriers
                .iter()
                .copied()
                .find(|&b| !finished[b])
                .unwrap_or(n);

            let candidates: Vec<usize> = (0..n)
                .filter(|&i| !finished[i] && indeg[i] == 0 && i <= next_barrier)
                .collect();
            if candidates.is_empty() {
                return Err(ModelError::internal(
                    "timestamp frontier is empty (dependency cycle)",
                ));
            }
            let pick = candidates[self.stamp_rng.gen_range(0..candidates.len())];

            let prepared = matches!(
                sequences[pick].kind,
                SequenceKind::Transaction { prepared: true, .. }
            );
            self.stamp_sequence(&mut sequences[pick], prepared);

            finished[pick] = true;
            let dependents = sequences[pick].dependents.clone();
            for d in dependents {
                indeg[d] -= 1;
            }
        }
        Ok(())
    }

    /// Fill a sequence's placeholder timestamps from the advancing window.
    ///
    /// Draws are strictly increasing across the whole assignment pass, so
    /// within one transaction the explicit set-commit samples increase,
    /// the final commit stamp exceeds the last sample, and a prepared
    /// transaction gets `prepare < commit <= durable` for free.
    fn stamp_sequence(&mut self, seq: &mut Sequence, prepared: bool) {
        for op in &mut seq.ops {
            match op {
                Operation::BeginTransaction { read_ts, .. } => {
                    // Snapshot at the current watermark: everything already
                    // stamped is visible, nothing later is.
                    *read_ts = Timestamp::new(self.clock);
                }
                Operation::SetCommitTimestamp { commit_ts, .. } => {
                    *commit_ts = self.next_stamp();
                }
                Operation::PrepareTransaction { prepare_ts, .. } => {
                    *prepare_ts = self.next_stamp();
                }
                Operation::CommitTransaction {
                    commit_ts,
                    durable_ts,
                    ..
                } => {
                    let commit = self.next_stamp();
                    *commit_ts = commit;
                    *durable_ts = if prepared { self.next_stamp() } else { commit };
                }
                Operation::SetStableTimestamp { stable_ts } => {
                    *stable_ts = Timestamp::new(self.clock);
                }
                Operation::Insert { .. }
                | Operation::Remove { .. }
                | Operation::Truncate { .. }
                | Operation::RollbackTransaction { .. }
                | Operation::CreateTable { .. }
                | Operation::Checkpoint { .. }
                | Operation::RollbackToStable
                | Operation::Restart
                | Operation::Crash => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // Pass 4: interleaving
    // ------------------------------------------------------------------

    fn interleave(&mut self, sequences: &[Sequence]) -> Result<Vec<Operation>> {
        let n = sequences.len();
        let mut indeg: Vec<usize> = sequences.iter().map(|s| s.depends_on.len()).collect();
        let mut runnable: Vec<usize> = (0..n).filter(|&i| indeg[i] == 0).collect();
        let mut running: Vec<(usize, usize)> = Vec::new(); // (sequence, next op)
        let mut finished = vec![false; n];
        let mut out = Vec::new();

        fn finish(
            sequences: &[Sequence],
            idx: usize,
            indeg: &mut [usize],
            runnable: &mut Vec<usize>,
            finished: &mut [bool],
        ) {
            finished[idx] = true;
            for &d in &sequences[idx].dependents {
                indeg[d] -= 1;
                if indeg[d] == 0 {
                    runnable.push(d);
                }
            }
        }

        loop {
            while running.len() < self.cfg.max_concurrent_transactions.max(1)
                && !runnable.is_empty()
            {
                let slot = self.schedule_rng.gen_range(0..runnable.len());
                let idx = runnable.swap_remove(slot);
                running.push((idx, 0));
            }

            if running.is_empty() {
                if finished.iter().all(|&f| f) {
                    break;
                }
                return Err(ModelError::internal(
                    "scheduler stalled with unfinished sequences",
                ));
            }

            let slot = self.schedule_rng.gen_range(0..running.len());
            let (idx, pos) = running[slot];
            let Some(op) = sequences[idx].ops.get(pos).cloned() else {
                return Err(ModelError::internal(format!(
                    "scheduler asked to advance exhausted sequence {idx}"
                )));
            };
            let is_restart = matches!(op, Operation::Restart);
            out.push(op);
            running[slot].1 = pos + 1;

            if running[slot].1 == sequences[idx].ops.len() {
                running.swap_remove(slot);
                finish(sequences, idx, &mut indeg, &mut runnable, &mut finished);
            }

            if is_restart {
                // The engine loses non-durable in-flight work on restart:
                // everything begun but unfinished is abandoned; remaining
                // operations dropped, dependents unblocked as if finished.
                let abandoned: Vec<usize> = running.drain(..).map(|(i, _)| i).collect();
                for i in abandoned {
                    tracing::debug!(sequence = i, "abandoned by restart");
                    finish(sequences, i, &mut indeg, &mut runnable, &mut finished);
                }
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn small_config(seed: u64) -> GeneratorConfig {
        GeneratorConfig {
            seed,
            sequence_count: 40,
            table_count: 2,
            ..GeneratorConfig::default()
        }
    }

    #[test]
    fn same_seed_produces_identical_jsonl() {
        let a = generate(small_config(7)).unwrap().to_jsonl().unwrap();
        let b = generate(small_config(7)).unwrap().to_jsonl().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_seeds_differ() {
        let a = generate(small_config(1)).unwrap().to_jsonl().unwrap();
        let b = generate(small_config(2)).unwrap().to_jsonl().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn setup_creates_tables_first() {
        let workload = generate(small_config(5)).unwrap();
        assert!(matches!(workload.ops[0], Operation::CreateTable { .. }));
        assert!(matches!(workload.ops[1], Operation::CreateTable { .. }));
        assert!(
            !workload.ops[2..]
                .iter()
                .any(|op| matches!(op, Operation::CreateTable { .. })),
            "DDL only in setup"
        );
    }

    #[test]
    fn empty_probability_table_is_internal_error() {
        let cfg = GeneratorConfig {
            weights: OperationWeights {
                insert: 0,
                remove: 0,
                truncate: 0,
                set_commit_timestamp: 0,
                finish: 0,
            },
            standalone_percent: 0,
            ..small_config(3)
        };
        let err = generate(cfg).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn transactions_are_well_formed() {
        let workload = generate(small_config(11)).unwrap();
        let mut open: HashMap<u64, bool> = HashMap::new(); // txn -> prepared
        let mut closed: Vec<u64> = Vec::new();

        for op in &workload.ops {
            match op {
                Operation::BeginTransaction { txn, .. } => {
                    assert!(open.insert(txn.get(), false).is_none(), "double begin");
                }
                Operation::PrepareTransaction { txn, .. } => {
                    let prepared = open.get_mut(&txn.get()).expect("prepare without begin");
                    assert!(!*prepared, "double prepare");
                    *prepared = true;
                }
                Operation::CommitTransaction { txn, .. }
                | Operation::RollbackTransaction { txn } => {
                    assert!(open.remove(&txn.get()).is_some(), "finish without begin");
                    assert!(!closed.contains(&txn.get()), "txn finished twice");
                    closed.push(txn.get());
                }
                Operation::Insert { txn: Some(txn), .. }
                | Operation::Remove { txn: Some(txn), .. }
                | Operation::Truncate { txn, .. } => {
                    assert!(
                        !open[&txn.get()],
                        "write after prepare must not be generated"
                    );
                }
                _ => {}
            }
        }
        // Anything left open was abandoned by a restart; a restart must
        // then exist in the flat workload.
        if !open.is_empty() {
            assert!(workload.ops.contains(&Operation::Restart));
        }
    }

    #[test]
    fn prepared_stamp_ordering_holds() {
        let workload = generate(GeneratorConfig {
            prepared_percent: 100,
            rollback_percent: 0,
            ..small_config(13)
        })
        .unwrap();

        let mut prepare_ts: HashMap<u64, Timestamp> = HashMap::new();
        let mut saw_prepared_commit = false;
        for op in &workload.ops {
            match op {
                Operation::PrepareTransaction { txn, prepare_ts: ts } => {
                    prepare_ts.insert(txn.get(), *ts);
                }
                Operation::CommitTransaction {
                    txn,
                    commit_ts,
                    durable_ts,
                } => {
                    let prepare = prepare_ts[&txn.get()];
                    assert!(prepare < *commit_ts, "prepare < commit");
                    assert!(commit_ts <= durable_ts, "commit <= durable");
                    saw_prepared_commit = true;
                }
                _ => {}
            }
        }
        assert!(saw_prepared_commit);
    }

    #[test]
    fn set_commit_samples_increase_within_transaction() {
        let workload = generate(GeneratorConfig {
            prepared_percent: 0,
            weights: OperationWeights {
                set_commit_timestamp: 40,
                ..OperationWeights::default()
            },
            ..small_config(17)
        })
        .unwrap();

        let mut last_sample: HashMap<u64, Timestamp> = HashMap::new();
        let mut saw_sample = false;
        for op in &workload.ops {
            match op {
                Operation::SetCommitTimestamp { txn, commit_ts } => {
                    saw_sample = true;
                    if let Some(prev) = last_sample.insert(txn.get(), *commit_ts) {
                        assert!(prev < *commit_ts, "samples must increase");
                    }
                }
                Operation::CommitTransaction { txn, commit_ts, .. } => {
                    if let Some(sample) = last_sample.get(&txn.get()) {
                        assert!(sample <= commit_ts, "final commit >= last sample");
                    }
                }
                _ => {}
            }
        }
        assert!(saw_sample);
    }

    #[test]
    fn dependency_respect_for_overlapping_ranges() {
        let cfg = GeneratorConfig {
            // A small key domain forces plenty of overlap.
            key_domain: 20,
            standalone_percent: 0,
            ..small_config(19)
        };
        let mut generator = Generator::new(cfg);
        let mut sequences = generator.synthesize().unwrap();
        build_dependencies(&mut sequences);
        generator.assign_timestamps(&mut sequences).unwrap();
        let edges: Vec<(usize, usize)> = sequences
            .iter()
            .flat_map(|s| s.depends_on.iter().map(|&d| (d, s.index)).collect::<Vec<_>>())
            .collect();
        assert!(!edges.is_empty(), "seed should produce overlap edges");

        let ops = generator.interleave(&sequences).unwrap();

        // Position of each transaction sequence's first and last op.
        let by_txn: HashMap<u64, usize> = sequences
            .iter()
            .filter_map(|s| match &s.kind {
                SequenceKind::Transaction { txn, .. } => Some((txn.get(), s.index)),
                SequenceKind::Standalone => None,
            })
            .collect();
        let mut first_pos: HashMap<usize, usize> = HashMap::new();
        let mut last_pos: HashMap<usize, usize> = HashMap::new();
        for (pos, op) in ops.iter().enumerate() {
            if let Some(txn) = op.transaction_id() {
                let seq = by_txn[&txn.get()];
                first_pos.entry(seq).or_insert(pos);
                last_pos.insert(seq, pos);
            }
        }

        for (first, second) in edges {
            let (Some(&f_last), Some(&s_first)) = (last_pos.get(&first), first_pos.get(&second))
            else {
                continue;
            };
            assert!(
                f_last < s_first,
                "sequence {first} must fully precede sequence {second}"
            );
        }
    }

    #[test]
    fn concurrency_cap_is_respected() {
        let cfg = GeneratorConfig {
            max_concurrent_transactions: 2,
            standalone_percent: 0,
            sequence_count: 60,
            ..small_config(23)
        };
        let workload = generate(cfg).unwrap();

        let mut active = 0_usize;
        for op in &workload.ops {
            match op {
                Operation::BeginTransaction { .. } => {
                    active += 1;
                    assert!(active <= 2, "more than max_concurrent active");
                }
                Operation::CommitTransaction { .. } | Operation::RollbackTransaction { .. } => {
                    active -= 1;
                }
                _ => {}
            }
        }
    }

    #[test]
    fn barrier_depends_on_its_window() {
        let cfg = GeneratorConfig {
            standalone_percent: 30,
            sequence_count: 40,
            ..small_config(29)
        };
        let mut generator = Generator::new(cfg);
        let mut sequences = generator.synthesize().unwrap();
        build_dependencies(&mut sequences);

        let mut window_start = 0;
        let mut saw_barrier = false;
        for seq in &sequences {
            if seq.is_standalone() {
                saw_barrier = true;
                for i in window_start..seq.index {
                    assert!(
                        seq.depends_on.contains(&i),
                        "barrier {} must depend on {i}",
                        seq.index
                    );
                }
                window_start = seq.index + 1;
            }
        }
        assert!(saw_barrier, "seed should produce standalone sequences");
    }

    #[test]
    fn restart_abandons_in_flight_sequences() {
        // Hunt a seed whose workload has a restart with open transactions;
        // the mechanism must hold for every seed along the way.
        for seed in 0..200 {
            let cfg = GeneratorConfig {
                standalone_percent: 25,
                standalone_weights: StandaloneWeights {
                    checkpoint: 0,
                    restart: 100,
                    set_stable_timestamp: 0,
                },
                sequence_count: 30,
                ..small_config(seed)
            };
            let workload = generate(cfg).unwrap();
            let ops = &workload.ops;

            let mut open: Vec<u64> = Vec::new();
            let mut abandoned_any = false;
            for (pos, op) in ops.iter().enumerate() {
                match op {
                    Operation::BeginTransaction { txn, .. } => open.push(txn.get()),
                    Operation::CommitTransaction { txn, .. }
                    | Operation::RollbackTransaction { txn } => {
                        open.retain(|&id| id != txn.get());
                    }
                    Operation::Restart => {
                        abandoned_any |= !open.is_empty();
                        for &id in &open {
                            let reappears = ops[pos + 1..]
                                .iter()
                                .any(|later| later.transaction_id() == Some(TxnId::new(id)));
                            assert!(!reappears, "abandoned txn#{id} reappears after restart");
                        }
                        open.clear();
                    }
                    _ => {}
                }
            }
            if abandoned_any {
                return;
            }
        }
        panic!("no seed produced a restart with in-flight transactions");
    }
}
