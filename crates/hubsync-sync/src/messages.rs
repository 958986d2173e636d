//! Sync protocol message types.
//!
//! These are the requests a hub sends to a peer during a sync pass and the
//! responses it serves when a peer syncs from it.

use serde::{Deserialize, Serialize};
use std::fmt;

use hubsync_core::{Message, SyncId};

use crate::snapshot::Snapshot;
use crate::trie::{TrieNodeMetadata, TRIE_DEPTH};

/// Identity of a peer in the sync network.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(pub [u8; 32]);

impl PeerId {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generate a random peer ID.
    pub fn random() -> Self {
        use rand::Rng;
        Self(rand::thread_rng().gen())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..12])
    }
}

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Message size limits.
pub mod limits {
    /// Longest prefix a request may name.
    pub const MAX_PREFIX_LENGTH: usize = super::TRIE_DEPTH;
    /// Max ids in a SyncIds response.
    pub const MAX_SYNC_IDS: usize = crate::trie::MAX_SYNC_IDS_PER_PREFIX;
    /// Max ids in one GetMessagesByIds request.
    pub const MAX_MESSAGE_IDS_PER_REQUEST: usize = 256;
    /// Max messages in one Messages response.
    pub const MAX_MESSAGES_PER_RESPONSE: usize = 256;
    /// Max excluded hashes in a snapshot.
    pub const MAX_EXCLUDED_HASHES: usize = 16;
}

/// Requests a hub sends to a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncRequest {
    /// Current snapshot of the peer's trie.
    GetSnapshot { protocol_version: u8 },
    /// The peer's node at `prefix` with its children.
    GetMetadataByPrefix { prefix: Vec<u8> },
    /// The peer's ids under `prefix`, capped.
    GetSyncIdsByPrefix { prefix: Vec<u8> },
    /// Full messages for these ids.
    GetMessagesByIds { ids: Vec<SyncId> },
}

/// Responses a hub serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncResponse {
    Snapshot(Snapshot),
    Metadata(TrieNodeMetadata),
    SyncIds(Vec<SyncId>),
    Messages(Vec<Message>),
    Error { code: SyncErrorCode, message: String },
}

impl SyncRequest {
    /// Check if this request respects size limits.
    pub fn validate_limits(&self) -> Result<(), &'static str> {
        match self {
            SyncRequest::GetSnapshot { .. } => {}
            SyncRequest::GetMetadataByPrefix { prefix }
            | SyncRequest::GetSyncIdsByPrefix { prefix } => {
                if prefix.len() > limits::MAX_PREFIX_LENGTH {
                    return Err("prefix longer than a sync id");
                }
            }
            SyncRequest::GetMessagesByIds { ids } => {
                if ids.len() > limits::MAX_MESSAGE_IDS_PER_REQUEST {
                    return Err("too many message ids");
                }
            }
        }
        Ok(())
    }
}

impl SyncResponse {
    /// Check if this response respects size limits.
    pub fn validate_limits(&self) -> Result<(), &'static str> {
        match self {
            SyncResponse::Snapshot(snapshot) => {
                if snapshot.excluded_hashes.len() > limits::MAX_EXCLUDED_HASHES {
                    return Err("too many excluded hashes");
                }
            }
            SyncResponse::Metadata(meta) => {
                if meta.prefix.len() > limits::MAX_PREFIX_LENGTH {
                    return Err("prefix longer than a sync id");
                }
            }
            SyncResponse::SyncIds(ids) => {
                if ids.len() > limits::MAX_SYNC_IDS {
                    return Err("too many sync ids");
                }
            }
            SyncResponse::Messages(messages) => {
                if messages.len() > limits::MAX_MESSAGES_PER_RESPONSE {
                    return Err("too many messages");
                }
            }
            SyncResponse::Error { .. } => {}
        }
        Ok(())
    }
}

/// Error codes for sync protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum SyncErrorCode {
    /// Protocol version mismatch.
    VersionMismatch = 1,
    /// Message too large.
    MessageTooLarge = 2,
    /// Malformed id, prefix or message in the request.
    InvalidMessage = 3,
    /// Internal error on peer.
    InternalError = 6,
}
