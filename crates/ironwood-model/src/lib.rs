//! In-memory reference model of a multi-version, timestamp-ordered
//! transactional key-value store.
//!
//! The model is a logical surrogate for the production engine: it carries
//! no pages, trees, or I/O, only enough structure to produce the same
//! answers a correct engine would produce for any sequence of transactional
//! operations, so its reads can be diffed against the real engine's.

pub mod chain;
pub mod database;
pub mod table;
pub mod txn;
pub mod verify;

pub use chain::{VersionChain, VersionRecord};
pub use database::{Checkpoint, DEFAULT_CHECKPOINT_NAME, Database};
pub use table::Table;
pub use txn::{CommitStamps, Transaction, TxnState};
pub use verify::{VerifyFailure, verify_table};
