//! Error types for the store module.

use hubsync_core::CoreError;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Row or event serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Malformed family, type or key. The caller's input is at fault.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Incoming add is older than everything the owner keeps at the prune limit.
    #[error("message would be pruned immediately: fid {fid}, limit {limit}")]
    Prunable { fid: u64, limit: usize },

    /// The persistence backend refused the operation.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Hub event ids ran out within one millisecond.
    #[error("event id sequence exhausted")]
    EventIdOverflow,

    /// The sync index rejected an update.
    #[error("index error: {0}")]
    Index(String),

    /// A lock or blocking task failed.
    #[error("internal error: {0}")]
    Internal(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed core value.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl StoreError {
    /// True for errors caused by the input rather than the store.
    pub fn is_bad_request(&self) -> bool {
        matches!(self, StoreError::InvalidArgument(_) | StoreError::Core(_))
    }

    /// True for errors sync should count as "try later" rather than failure.
    pub fn is_deferrable(&self) -> bool {
        matches!(self, StoreError::Prunable { .. })
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
