//! Workload generation and replay for the ironwood reference model.
//!
//! The generator synthesizes internally-consistent transaction schedules
//! (no two overlapping-key sequences run concurrently), assigns
//! monotonically sane timestamps across the partial order, and interleaves
//! independent sequences into one flat workload. The same flat sequence is
//! replayed against the model here and against the production engine by an
//! external executor; outcomes are compared 1:1.

pub mod generator;
pub mod ops;
pub mod replay;
pub mod sequence;

pub use generator::{GeneratorConfig, OperationWeights, StandaloneWeights, generate};
pub use ops::{Operation, RngSpec, Workload, WorkloadHeader};
pub use replay::{OpOutcome, ReplayReport, Replayer, replay};
pub use sequence::{Sequence, SequenceKind};
