use thiserror::Error;

/// Primary error type for the ironwood reference model and its tools.
///
/// Two of the coarse codes (`NotFound`, `DuplicateKey`) are ordinary,
/// data-dependent outcomes that executors compare against the production
/// engine's return codes. The rest indicate a modeling gap or a caller bug
/// and abort the current run.
#[derive(Error, Debug)]
pub enum ModelError {
    // === Not-found family ===
    /// No table with this name is registered.
    #[error("no such table: {name}")]
    TableNotFound { name: String },

    /// No table with this id is registered.
    #[error("no such table id: {id}")]
    TableIdNotFound { id: u32 },

    /// A read or precondition targeted a key with no visible value.
    #[error("key not found: {key}")]
    KeyNotFound { key: String },

    /// No transaction with this id is active.
    #[error("no such transaction: {id}")]
    TransactionNotFound { id: u64 },

    /// No checkpoint with this name exists.
    #[error("no such checkpoint: {name}")]
    CheckpointNotFound { name: String },

    // === Duplicate family ===
    /// An insert without overwrite targeted a key whose most recent entry
    /// is non-absent.
    #[error("duplicate key: {key}")]
    DuplicateKey { key: String },

    /// A table with this name already exists.
    #[error("table {name} already exists")]
    TableExists { name: String },

    /// A checkpoint with this name already exists.
    #[error("checkpoint {name} already exists")]
    CheckpointExists { name: String },

    // === Invalid-state family ===
    /// A transaction operation arrived in the wrong lifecycle state.
    #[error("transaction {id} is {actual}, expected {expected}")]
    InvalidTransactionState {
        id: u64,
        expected: &'static str,
        actual: &'static str,
    },

    /// A write was attempted after prepare.
    #[error("transaction {id} is prepared and can no longer buffer writes")]
    WriteAfterPrepare { id: u64 },

    /// A global (no-timestamp) write hit a timestamped chain, or vice versa.
    #[error("key {key}: mixing timestamped and non-timestamped updates")]
    TimestampMode { key: String },

    /// Commit/prepare/durable timestamps violate the required ordering.
    #[error("bad timestamp order for transaction {id}: {detail}")]
    TimestampOrder { id: u64, detail: String },

    /// A key or value does not fit the table's declared format.
    #[error("value {value} does not fit format '{format}'")]
    TypeMismatch { format: char, value: String },

    // === Unsupported / internal ===
    /// A construct outside the model's scope was encountered.
    #[error("unsupported: {what}")]
    Unsupported { what: String },

    /// An invariant the model or generator relies on was violated.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse result codes mirrored against the production engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    /// Successful result (never carried by a `ModelError`).
    Ok = 0,
    /// Target key/table/transaction/checkpoint does not exist.
    NotFound = 1,
    /// Insert without overwrite hit a live key, or a registry name collided.
    DuplicateKey = 2,
    /// Operation attempted in the wrong lifecycle state.
    InvalidState = 3,
    /// Construct outside the model's scope.
    Unsupported = 4,
    /// Broken internal invariant.
    Internal = 5,
}

impl ModelError {
    /// Map this error to its coarse code.
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::TableNotFound { .. }
            | Self::TableIdNotFound { .. }
            | Self::KeyNotFound { .. }
            | Self::TransactionNotFound { .. }
            | Self::CheckpointNotFound { .. } => ErrorCode::NotFound,
            Self::DuplicateKey { .. }
            | Self::TableExists { .. }
            | Self::CheckpointExists { .. } => ErrorCode::DuplicateKey,
            Self::InvalidTransactionState { .. }
            | Self::WriteAfterPrepare { .. }
            | Self::TimestampMode { .. }
            | Self::TimestampOrder { .. }
            | Self::TypeMismatch { .. } => ErrorCode::InvalidState,
            Self::Unsupported { .. } => ErrorCode::Unsupported,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether this is an ordinary data-dependent outcome that executors
    /// compare against the engine (as opposed to a run-aborting failure).
    pub const fn is_data_outcome(&self) -> bool {
        matches!(self.code(), ErrorCode::NotFound | ErrorCode::DuplicateKey)
    }

    /// Whether this error must abort the current run.
    pub const fn is_fatal(&self) -> bool {
        !self.is_data_outcome()
    }

    /// Process exit code for batch tools.
    pub const fn exit_code(&self) -> i32 {
        self.code() as i32
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an unsupported-construct error.
    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::Unsupported { what: what.into() }
    }
}

/// Result type alias using `ModelError`.
pub type Result<T> = std::result::Result<T, ModelError>;
