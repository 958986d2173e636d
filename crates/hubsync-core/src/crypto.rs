//! Hashing primitives for hubsync.
//!
//! Every digest in the system (message hashes, trie node digests, snapshot
//! exclusion hashes) is Blake3 truncated to 160 bits.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Length in bytes of every digest produced by [`hash160`].
pub const HASH_LENGTH: usize = 20;

/// Blake3 truncated to 160 bits.
pub fn hash160(data: &[u8]) -> [u8; HASH_LENGTH] {
    let full = blake3::hash(data);
    let mut out = [0u8; HASH_LENGTH];
    out.copy_from_slice(&full.as_bytes()[..HASH_LENGTH]);
    out
}

/// Incremental form of [`hash160`], used when folding child digests.
#[derive(Default)]
pub struct Hasher160(blake3::Hasher);

impl Hasher160 {
    /// Start a new digest.
    pub fn new() -> Self {
        Self(blake3::Hasher::new())
    }

    /// Feed bytes into the digest.
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.0.update(data);
        self
    }

    /// Finish and truncate.
    pub fn finalize(&self) -> [u8; HASH_LENGTH] {
        let full = self.0.finalize();
        let mut out = [0u8; HASH_LENGTH];
        out.copy_from_slice(&full.as_bytes()[..HASH_LENGTH]);
        out
    }
}

/// Content hash of a message: `hash160` over the CBOR encoding of its data.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageHash(pub [u8; HASH_LENGTH]);

impl MessageHash {
    /// Hash arbitrary bytes.
    pub fn hash(data: &[u8]) -> Self {
        Self(hash160(data))
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The zero hash (sentinel value).
    pub const ZERO: Self = Self([0u8; HASH_LENGTH]);
}

impl fmt::Debug for MessageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for MessageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for MessageHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; HASH_LENGTH]> for MessageHash {
    fn from(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }
}

/// A 32-byte signer public key.
///
/// Opaque to this crate; signature checks happen upstream.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SignerKey(pub [u8; 32]);

impl SignerKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for SignerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignerKey({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for SignerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}
