//! Strong type definitions for hubsync.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::{MessageHash, HASH_LENGTH};
use crate::error::CoreError;

/// Width of the timestamp prefix of a [`SyncId`].
pub const TIMESTAMP_LENGTH: usize = 4;

/// Total width of a [`SyncId`].
pub const SYNC_ID_LENGTH: usize = TIMESTAMP_LENGTH + HASH_LENGTH;

/// Numeric owner identity of a set of messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fid(pub u64);

impl Fid {
    /// Big-endian encoding used in storage keys.
    pub const fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for Fid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Fid {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// The trie key of a message: `timestamp (u32 BE) ++ hash`.
///
/// Lexicographic byte order makes the timestamp the primary sort key and the
/// hash the tie-breaker.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SyncId(pub [u8; SYNC_ID_LENGTH]);

impl SyncId {
    /// Build from a network timestamp and a message hash.
    pub fn new(timestamp: u32, hash: &MessageHash) -> Self {
        let mut bytes = [0u8; SYNC_ID_LENGTH];
        bytes[..TIMESTAMP_LENGTH].copy_from_slice(&timestamp.to_be_bytes());
        bytes[TIMESTAMP_LENGTH..].copy_from_slice(hash.as_bytes());
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; SYNC_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; SYNC_ID_LENGTH] {
        &self.0
    }

    /// The timestamp component.
    pub fn timestamp(&self) -> u32 {
        let mut ts = [0u8; TIMESTAMP_LENGTH];
        ts.copy_from_slice(&self.0[..TIMESTAMP_LENGTH]);
        u32::from_be_bytes(ts)
    }

    /// The hash component.
    pub fn hash(&self) -> MessageHash {
        let mut hash = [0u8; HASH_LENGTH];
        hash.copy_from_slice(&self.0[TIMESTAMP_LENGTH..]);
        MessageHash(hash)
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for SyncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyncId({}:{})", self.timestamp(), &hex::encode(&self.0[TIMESTAMP_LENGTH..])[..12])
    }
}

impl fmt::Display for SyncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for SyncId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for SyncId {
    type Error = CoreError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; SYNC_ID_LENGTH] =
            slice.try_into().map_err(|_| CoreError::MalformedSyncId {
                expected: SYNC_ID_LENGTH,
                got: slice.len(),
            })?;
        Ok(Self(arr))
    }
}
