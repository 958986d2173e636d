//! # hubsync sync
//!
//! Merkle-trie reconciliation between hubs.
//!
//! ## Overview
//!
//! Every admitted message contributes its [`SyncId`](hubsync_core::SyncId)
//! to a [`MerkleTrie`]. Two hubs compare [`Snapshot`]s to decide whether a
//! pass is worthwhile, then walk each other's tries top-down, descending
//! only where digests differ, and fetch the messages they lack. Fetched
//! messages go through the same merge path as local submissions.
//!
//! ## Key Types
//!
//! - [`MerkleTrie`] - Fixed-depth trie over sync ids
//! - [`SyncEngine`] - Decides when to sync and runs passes
//! - [`PeerScorer`] - Turns pass outcomes into peer reputation
//! - [`PeerClient`] / [`SyncServer`] - RPC seams
//!
//! ## Message Flow
//!
//! ```text
//! Hub A                                   Hub B
//!   |-------- GetSnapshot ---------------->|
//!   |<------- Snapshot --------------------|
//!   |   should_sync?                       |
//!   |-------- GetMetadataByPrefix([]) ---->|
//!   |<------- Metadata --------------------|
//!   |   ... descend divergent children ... |
//!   |-------- GetSyncIdsByPrefix(p) ------>|
//!   |<------- SyncIds ---------------------|
//!   |-------- GetMessagesByIds ----------->|
//!   |<------- Messages --------------------|
//!   |   merge, report to PeerScorer        |
//! ```

pub mod convergence;
pub mod engine;
pub mod error;
pub mod messages;
pub mod peer_score;
pub mod snapshot;
pub mod transport;
pub mod trie;

pub use convergence::{compare_tries, verify_trie_matches_store, ConvergenceResult};
pub use engine::{MergeResult, MergeStatus, MessageMerger, SharedTrie, SyncConfig, SyncEngine};
pub use error::{Result, SyncError};
pub use messages::{limits, PeerId, SyncErrorCode, SyncRequest, SyncResponse, PROTOCOL_VERSION};
pub use peer_score::{PeerScore, PeerScorer, BLOCK_THRESHOLD};
pub use snapshot::{excluded_hashes_intersect, Snapshot, SnapshotCache};
pub use transport::{memory::MemoryPeerClient, PeerClient, SyncServer};
pub use trie::{
    empty_digest, DeleteResult, Digest, InsertResult, MerkleTrie, NodeDiff, TrieDiff,
    TrieNodeMetadata, TrieNodeSummary, TRIE_DEPTH,
};
