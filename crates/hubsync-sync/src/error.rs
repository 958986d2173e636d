//! Error types for the sync module.

use thiserror::Error;

use crate::messages::SyncErrorCode;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Protocol version mismatch with peer.
    #[error("protocol version mismatch: local={local}, peer={peer}")]
    VersionMismatch { local: u8, peer: u8 },

    /// Message validation failed.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// Store operation failed.
    #[error("store error: {0}")]
    StoreError(#[from] hubsync_store::StoreError),

    /// Malformed id or key.
    #[error("core error: {0}")]
    CoreError(#[from] hubsync_core::CoreError),

    /// Peer sent an error message.
    #[error("peer error ({code:?}): {message}")]
    PeerError { code: SyncErrorCode, message: String },

    /// Timeout waiting for peer.
    #[error("timeout: {0}")]
    Timeout(String),

    /// A trie digest or count no longer matches its children.
    #[error("trie invariant violated at prefix {prefix}: {detail}")]
    InvariantViolation { prefix: String, detail: String },

    /// Peer is blocked by the scorer.
    #[error("peer blocked: {0}")]
    PeerBlocked(String),

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Wire code a server reports for this error.
    pub fn code(&self) -> SyncErrorCode {
        match self {
            SyncError::VersionMismatch { .. } => SyncErrorCode::VersionMismatch,
            SyncError::InvalidMessage(_) | SyncError::CoreError(_) => SyncErrorCode::InvalidMessage,
            SyncError::StoreError(e) if e.is_bad_request() => SyncErrorCode::InvalidMessage,
            _ => SyncErrorCode::InternalError,
        }
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
