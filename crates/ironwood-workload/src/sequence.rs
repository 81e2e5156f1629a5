//! Workload sequences and their dependency edges.
//!
//! A sequence is an ordered run of operations that must execute as a unit:
//! either exactly one transaction's full lifetime (begin … commit/rollback)
//! or a single standalone action. Sequences are created during generation
//! and never mutated after the flattening pass; the dependency counters are
//! plain integers because generation is single-threaded.

use ironwood_types::{TableId, TxnId};

use crate::ops::Operation;

/// What a sequence is, for dependency analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceKind {
    /// One transaction's lifetime on one table.
    Transaction {
        txn: TxnId,
        table: TableId,
        /// Inclusive range of keys touched, if any write landed.
        key_range: Option<(u64, u64)>,
        prepared: bool,
    },
    /// A single standalone action (checkpoint / restart / set-stable);
    /// a timestamp barrier.
    Standalone,
}

/// A unit of generation.
#[derive(Debug, Clone)]
pub struct Sequence {
    /// Generation order; also the tiebreak for barrier windows.
    pub index: usize,
    pub kind: SequenceKind,
    pub ops: Vec<Operation>,
    /// Indices of sequences that must finish before this one starts.
    pub depends_on: Vec<usize>,
    /// Indices of sequences waiting on this one.
    pub dependents: Vec<usize>,
}

impl Sequence {
    #[must_use]
    pub fn new(index: usize, kind: SequenceKind, ops: Vec<Operation>) -> Self {
        Self {
            index,
            kind,
            ops,
            depends_on: Vec::new(),
            dependents: Vec::new(),
        }
    }

    /// Whether this sequence is a standalone barrier.
    #[must_use]
    pub fn is_standalone(&self) -> bool {
        matches!(self.kind, SequenceKind::Standalone)
    }

    /// Whether two transaction sequences touch overlapping key ranges on
    /// the same table. An overlapping second transaction would, in the
    /// real engine, observe a write conflict if run concurrently, so the
    /// generator serializes them instead of leaving the outcome ambiguous.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        let (
            SequenceKind::Transaction {
                table: ta,
                key_range: Some((lo_a, hi_a)),
                ..
            },
            SequenceKind::Transaction {
                table: tb,
                key_range: Some((lo_b, hi_b)),
                ..
            },
        ) = (&self.kind, &other.kind)
        else {
            return false;
        };
        ta == tb && lo_a <= hi_b && lo_b <= hi_a
    }
}

/// Record a "first must finish before second starts" edge.
pub fn add_edge(sequences: &mut [Sequence], first: usize, second: usize) {
    debug_assert!(first < second, "edges always point forward");
    if !sequences[second].depends_on.contains(&first) {
        sequences[second].depends_on.push(first);
        sequences[first].dependents.push(second);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn_seq(index: usize, table: u32, range: Option<(u64, u64)>) -> Sequence {
        Sequence::new(
            index,
            SequenceKind::Transaction {
                txn: TxnId::new(index as u64 + 1),
                table: TableId::new(table),
                key_range: range,
                prepared: false,
            },
            Vec::new(),
        )
    }

    #[test]
    fn overlap_same_table() {
        let a = txn_seq(0, 1, Some((5, 10)));
        let b = txn_seq(1, 1, Some((10, 20)));
        let c = txn_seq(2, 1, Some((11, 20)));
        assert!(a.overlaps(&b), "shared boundary key overlaps");
        assert!(!a.overlaps(&c));
        assert!(b.overlaps(&c));
    }

    #[test]
    fn no_overlap_across_tables_or_without_writes() {
        let a = txn_seq(0, 1, Some((5, 10)));
        let b = txn_seq(1, 2, Some((5, 10)));
        let c = txn_seq(2, 1, None);
        let s = Sequence::new(3, SequenceKind::Standalone, vec![Operation::Restart]);
        assert!(!a.overlaps(&b), "different tables never conflict");
        assert!(!a.overlaps(&c), "read-free transactions have no range");
        assert!(!a.overlaps(&s));
    }

    #[test]
    fn add_edge_dedups() {
        let mut seqs = vec![txn_seq(0, 1, Some((0, 1))), txn_seq(1, 1, Some((1, 2)))];
        add_edge(&mut seqs, 0, 1);
        add_edge(&mut seqs, 0, 1);
        assert_eq!(seqs[1].depends_on, vec![0]);
        assert_eq!(seqs[0].dependents, vec![1]);
    }
}
