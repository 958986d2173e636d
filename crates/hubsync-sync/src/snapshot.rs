//! Snapshots: a coarse, cacheable summary of the trie for "should we sync?".
//!
//! The snapshot timestamp is network time rounded down to a 10 second
//! bucket. `excluded_hashes[k]` is the digest of every id older than
//! `timestamp - 10k`, so two hubs that agree on everything before a recent
//! bucket boundary share an entry, even when their clocks put them in
//! adjacent buckets.

use serde::{Deserialize, Serialize};

use crate::trie::{Digest, MerkleTrie};

/// Width of a snapshot bucket in seconds.
pub const SNAPSHOT_BUCKET_SECONDS: u32 = 10;

/// Number of recent bucket boundaries carried in a snapshot.
pub const EXCLUDED_HASH_COUNT: usize = 4;

/// Round network time down to its bucket.
pub fn snapshot_timestamp(now: u32) -> u32 {
    now / SNAPSHOT_BUCKET_SECONDS * SNAPSHOT_BUCKET_SECONDS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: u32,
    pub root_hash: Digest,
    pub num_messages: u64,
    pub excluded_hashes: Vec<Digest>,
}

impl Snapshot {
    /// Compute a snapshot of `trie` for network time `now`.
    pub fn compute(trie: &MerkleTrie, now: u32) -> Self {
        let timestamp = snapshot_timestamp(now);
        let excluded_hashes = (0..EXCLUDED_HASH_COUNT as u32)
            .map(|k| trie.digest_before(timestamp.saturating_sub(k * SNAPSHOT_BUCKET_SECONDS)))
            .collect();
        Self {
            timestamp,
            root_hash: trie.root_digest(),
            num_messages: trie.items(),
            excluded_hashes,
        }
    }
}

/// True when the lists share any digest, at any position.
pub fn excluded_hashes_intersect(local: &[Digest], remote: &[Digest]) -> bool {
    local.iter().any(|h| remote.contains(h))
}

/// Caches the last snapshot per (bucket, trie generation).
#[derive(Debug, Default)]
pub struct SnapshotCache {
    cached: Option<(u32, u64, Snapshot)>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute(&mut self, trie: &MerkleTrie, now: u32) -> Snapshot {
        let bucket = snapshot_timestamp(now);
        let generation = trie.generation();
        if let Some((b, g, snapshot)) = &self.cached {
            if *b == bucket && *g == generation {
                return snapshot.clone();
            }
        }
        let snapshot = Snapshot::compute(trie, now);
        self.cached = Some((bucket, generation, snapshot.clone()));
        snapshot
    }
}
