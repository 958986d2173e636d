//! Error types for the Hub.

use hubsync_core::{CoreError, Fid, Network};
use hubsync_store::StoreError;
use hubsync_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during Hub operations.
#[derive(Debug, Error)]
pub enum HubError {
    /// Malformed message or value.
    #[error("invalid message: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// The message's signer is not active for its fid.
    #[error("unknown signer for fid {fid}")]
    UnknownSigner { fid: Fid },

    /// The message was produced for another network.
    #[error("wrong network: expected {expected:?}, got {actual:?}")]
    WrongNetwork { expected: Network, actual: Network },

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HubError {
    /// True when the submitter is at fault and retrying will not help.
    pub fn is_bad_request(&self) -> bool {
        match self {
            HubError::Core(_) | HubError::WrongNetwork { .. } => true,
            HubError::Store(e) => e.is_bad_request(),
            _ => false,
        }
    }
}

/// Result type for Hub operations.
pub type Result<T> = std::result::Result<T, HubError>;
