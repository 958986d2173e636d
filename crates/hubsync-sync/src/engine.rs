//! Sync engine: whether to sync with a peer, and how.
//!
//! A pass compares snapshots, walks the peer's trie from the divergent
//! top-level prefixes down, collects ids the peer has and we lack, and
//! feeds the fetched messages through the same merge path as locally
//! submitted ones.

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use hubsync_core::time::network_now;
use hubsync_core::{Message, SyncId};
use hubsync_store::{MessageIndex, StoreError};

use crate::error::{Result, SyncError};
use crate::messages::{limits, PeerId};
use crate::peer_score::PeerScorer;
use crate::snapshot::{excluded_hashes_intersect, Snapshot, SnapshotCache};
use crate::trie::{Digest, MerkleTrie, NodeDiff, MAX_SYNC_IDS_PER_PREFIX};
use crate::transport::PeerClient;

// ────────────────────────────────────────────────────────────────────────────
// Configuration and results
// ────────────────────────────────────────────────────────────────────────────

/// Configuration for sync behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Timeout for each RPC to a peer.
    pub rpc_timeout_ms: u64,
    /// Fetch a remote node's ids directly once it holds at most this many.
    pub hashes_per_fetch: usize,
    /// Upper bound on passes running at once.
    pub max_concurrent_syncs: usize,
    /// Syncing with one peer more often than this costs score.
    pub min_sync_interval_ms: u64,
    /// How long `stop` waits for active passes.
    pub stop_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            rpc_timeout_ms: 10_000,
            hashes_per_fetch: 64,
            max_concurrent_syncs: 1,
            min_sync_interval_ms: 30_000,
            stop_timeout_ms: 5_000,
        }
    }
}

impl SyncConfig {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn min_sync_interval(&self) -> Duration {
        Duration::from_millis(self.min_sync_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Aggregate outcome of one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    pub total: u64,
    pub success_count: u64,
    pub deferred_count: u64,
    pub failed_count: u64,
}

impl MergeResult {
    /// Count the outcome of one fetched message. `total` is counted when
    /// the ids are requested.
    fn record(&mut self, status: MergeStatus) {
        match status {
            MergeStatus::Merged => self.success_count += 1,
            MergeStatus::Deferred => self.deferred_count += 1,
            MergeStatus::Failed => self.failed_count += 1,
            MergeStatus::NoOp => {}
        }
    }

    fn record_failures(&mut self, count: usize) {
        self.total += count as u64;
        self.failed_count += count as u64;
    }
}

/// How one fetched message fared in the local merge path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStatus {
    /// Admitted.
    Merged,
    /// Already present or outranked.
    NoOp,
    /// Cannot merge yet (unknown signer, prunable, missing dependency).
    Deferred,
    /// Rejected.
    Failed,
}

impl MergeStatus {
    /// Classify a store error from the merge path.
    pub fn from_store_error(err: &StoreError) -> Self {
        if err.is_deferrable() {
            MergeStatus::Deferred
        } else {
            MergeStatus::Failed
        }
    }
}

/// The local merge path a sync pass feeds fetched messages into.
#[async_trait]
pub trait MessageMerger: Send + Sync {
    async fn merge_message(&self, message: Message) -> MergeStatus;
}

// ────────────────────────────────────────────────────────────────────────────
// Shared trie
// ────────────────────────────────────────────────────────────────────────────

/// The trie shared between the engine and the store's commit path.
#[derive(Debug, Clone, Default)]
pub struct SharedTrie(Arc<RwLock<MerkleTrie>>);

impl SharedTrie {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, MerkleTrie> {
        self.0.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, MerkleTrie> {
        self.0.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl MessageIndex for SharedTrie {
    fn insert_sync_id(&self, id: SyncId) -> hubsync_store::Result<()> {
        self.write()
            .insert(&id)
            .map(|_| ())
            .map_err(|e| StoreError::Index(e.to_string()))
    }

    fn delete_sync_id(&self, id: SyncId) -> hubsync_store::Result<()> {
        self.write()
            .delete(&id)
            .map(|_| ())
            .map_err(|e| StoreError::Index(e.to_string()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Engine
// ────────────────────────────────────────────────────────────────────────────

/// Marks a peer as being synced with until dropped.
struct ActiveSync<'a> {
    active: &'a Mutex<HashSet<PeerId>>,
    peer: PeerId,
}

impl Drop for ActiveSync<'_> {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.peer);
    }
}

pub struct SyncEngine {
    config: SyncConfig,
    trie: SharedTrie,
    snapshots: Mutex<SnapshotCache>,
    scorer: PeerScorer,
    active: Mutex<HashSet<PeerId>>,
    interrupted: AtomicBool,
}

impl SyncEngine {
    pub fn new(config: SyncConfig) -> Self {
        Self::with_trie(config, SharedTrie::new())
    }

    pub fn with_trie(config: SyncConfig, trie: SharedTrie) -> Self {
        let scorer = PeerScorer::new(config.min_sync_interval());
        Self {
            config,
            trie,
            snapshots: Mutex::new(SnapshotCache::new()),
            scorer,
            active: Mutex::new(HashSet::new()),
            interrupted: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn trie(&self) -> &SharedTrie {
        &self.trie
    }

    pub fn scorer(&self) -> &PeerScorer {
        &self.scorer
    }

    /// Snapshot of the local trie for the current bucket.
    pub fn snapshot(&self) -> Result<Snapshot> {
        Ok(self.snapshot_at(network_now()?))
    }

    pub fn snapshot_at(&self, now: u32) -> Snapshot {
        let trie = self.trie.read();
        let mut cache = self.snapshots.lock().unwrap_or_else(|e| e.into_inner());
        cache.get_or_compute(&trie, now)
    }

    pub fn is_syncing(&self) -> bool {
        !self.active.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }

    /// Whether a peer advertising this snapshot has anything for us.
    pub fn should_sync(&self, peer_excluded_hashes: &[Digest], peer_num_messages: u64) -> Result<bool> {
        Ok(self.should_sync_at(peer_excluded_hashes, peer_num_messages, network_now()?))
    }

    pub fn should_sync_at(
        &self,
        peer_excluded_hashes: &[Digest],
        peer_num_messages: u64,
        now: u32,
    ) -> bool {
        if self.is_syncing() {
            tracing::debug!("already syncing");
            return false;
        }
        let local = self.snapshot_at(now);
        if excluded_hashes_intersect(&local.excluded_hashes, peer_excluded_hashes) {
            return false;
        }
        match peer_num_messages.cmp(&local.num_messages) {
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Equal => rand::random::<bool>(),
        }
    }

    fn try_begin(&self, peer: PeerId) -> Option<ActiveSync<'_>> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if active.contains(&peer) || active.len() >= self.config.max_concurrent_syncs {
            return None;
        }
        active.insert(peer);
        Some(ActiveSync {
            active: &self.active,
            peer,
        })
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    async fn rpc<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.config.rpc_timeout(), call).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(format!(
                "no response within {:?}",
                self.config.rpc_timeout()
            ))),
        }
    }

    /// Run one full pass against `client`.
    ///
    /// Returns `Ok(None)` when there was nothing to do or another pass is
    /// already running. The outcome of a completed pass is reported to the
    /// scorer.
    pub async fn sync_with_peer(
        &self,
        client: &dyn PeerClient,
        merger: &dyn MessageMerger,
    ) -> Result<Option<MergeResult>> {
        let peer = client.peer_id();
        if self.is_interrupted() {
            return Err(SyncError::Cancelled);
        }
        if self.scorer.is_blocked(&peer) {
            return Err(SyncError::PeerBlocked(peer.to_string()));
        }

        let snapshot = match self.rpc(client.get_sync_snapshot()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(peer = %peer, error = %e, "snapshot request failed");
                let mut result = MergeResult::default();
                result.record_failures(1);
                self.scorer.update_last_sync(peer, result);
                return Err(e);
            }
        };

        if !self.should_sync(&snapshot.excluded_hashes, snapshot.num_messages)? {
            tracing::debug!(peer = %peer, "skipping sync");
            return Ok(None);
        }
        let Some(_guard) = self.try_begin(peer) else {
            return Ok(None);
        };

        tracing::info!(
            peer = %peer,
            peer_messages = snapshot.num_messages,
            "starting sync"
        );

        let mut result = MergeResult::default();
        let prefixes = match self.rpc(client.get_sync_metadata_by_prefix(&[])).await {
            Ok(root) => {
                let diff = self.trie.read().diff_node(&root);
                match diff {
                    NodeDiff::Divergent { remote, .. } => remote,
                    _ => Vec::new(),
                }
            }
            Err(e) => {
                tracing::warn!(peer = %peer, error = %e, "root metadata request failed");
                result.record_failures(1);
                Vec::new()
            }
        };

        let pass = self.perform_sync(prefixes, client, merger).await;
        result.total += pass.total;
        result.success_count += pass.success_count;
        result.deferred_count += pass.deferred_count;
        result.failed_count += pass.failed_count;

        tracing::info!(
            peer = %peer,
            total = result.total,
            merged = result.success_count,
            deferred = result.deferred_count,
            failed = result.failed_count,
            "sync finished"
        );
        self.scorer.update_last_sync(peer, result);
        Ok(Some(result))
    }

    /// Reconcile the given prefixes against `client`, merging what we lack.
    pub async fn perform_sync(
        &self,
        prefixes: Vec<Vec<u8>>,
        client: &dyn PeerClient,
        merger: &dyn MessageMerger,
    ) -> MergeResult {
        let mut result = MergeResult::default();
        let mut pending: Vec<SyncId> = Vec::new();
        let mut stack = prefixes;
        stack.reverse();
        let direct_limit = self.config.hashes_per_fetch.min(MAX_SYNC_IDS_PER_PREFIX) as u64;

        while let Some(prefix) = stack.pop() {
            if self.is_interrupted() {
                tracing::info!("sync interrupted");
                break;
            }
            let remote = match self.rpc(client.get_sync_metadata_by_prefix(&prefix)).await {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::warn!(prefix = %hex::encode(&prefix), error = %e, "metadata request failed");
                    result.record_failures(1);
                    continue;
                }
            };
            let diff = self.trie.read().diff_node(&remote);
            match diff {
                NodeDiff::Identical | NodeDiff::MissingRemotely(_) => {}
                NodeDiff::MissingLocally(id) => pending.push(id),
                NodeDiff::Divergent { remote: children, .. } => {
                    let mut deeper = Vec::new();
                    for child in children {
                        let count = child
                            .last()
                            .and_then(|byte| remote.children.get(byte))
                            .map(|summary| summary.num_messages)
                            .unwrap_or(0);
                        if count > direct_limit {
                            deeper.push(child);
                            continue;
                        }
                        match self.rpc(client.get_sync_ids_by_prefix(&child)).await {
                            Ok(ids) => {
                                let trie = self.trie.read();
                                pending.extend(ids.into_iter().filter(|id| !trie.exists(id)));
                            }
                            Err(e) => {
                                tracing::warn!(prefix = %hex::encode(&child), error = %e, "sync id request failed");
                                result.record_failures(1);
                            }
                        }
                    }
                    deeper.reverse();
                    stack.extend(deeper);
                }
            }

            if pending.len() >= limits::MAX_MESSAGE_IDS_PER_REQUEST {
                self.fetch_and_merge(&mut pending, client, merger, &mut result)
                    .await;
            }
        }
        if !self.is_interrupted() {
            self.fetch_and_merge(&mut pending, client, merger, &mut result)
                .await;
        }
        result
    }

    async fn fetch_and_merge(
        &self,
        pending: &mut Vec<SyncId>,
        client: &dyn PeerClient,
        merger: &dyn MessageMerger,
        result: &mut MergeResult,
    ) {
        pending.sort();
        pending.dedup();
        for chunk in pending.chunks(limits::MAX_MESSAGE_IDS_PER_REQUEST) {
            if self.is_interrupted() {
                break;
            }
            let mut messages = match self.rpc(client.get_messages_by_ids(chunk)).await {
                Ok(messages) => messages,
                Err(e) => {
                    tracing::warn!(count = chunk.len(), error = %e, "message fetch failed");
                    result.record_failures(chunk.len());
                    continue;
                }
            };
            // Ids the peer advertised but does not return stay in `total`
            // without counting as success or deferral.
            result.total += chunk.len() as u64;
            let requested: HashSet<SyncId> = chunk.iter().copied().collect();
            let returned = messages.len();
            messages.retain(|m| requested.contains(&m.sync_id()));
            if messages.len() < returned {
                tracing::warn!(
                    unrequested = returned - messages.len(),
                    "peer returned messages that were not requested"
                );
            }
            if messages.len() < chunk.len() {
                tracing::debug!(
                    requested = chunk.len(),
                    returned = messages.len(),
                    "peer did not return every requested message"
                );
            }
            // Older messages first, so removes and prunes see their targets.
            messages.sort_by_key(|m| (m.timestamp(), m.hash));
            messages.dedup_by_key(|m| m.sync_id());
            for message in messages {
                let status = merger.merge_message(message).await;
                result.record(status);
            }
        }
        pending.clear();
    }

    /// Interrupt running passes and wait (bounded) for them to unwind.
    ///
    /// Returns false if a pass was still active when the timeout expired.
    pub async fn stop(&self) -> bool {
        self.interrupted.store(true, Ordering::SeqCst);
        let deadline = tokio::time::Instant::now() + self.config.stop_timeout();
        while self.is_syncing() {
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!("sync passes still active after stop timeout");
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }

    /// Allow new passes after a `stop`.
    pub fn resume(&self) {
        self.interrupted.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryPeerClient;
    use crate::transport::SyncServer;
    use crate::trie::TrieNodeMetadata;
    use hubsync_core::{Fid, MessageBuilder, MessageType, ReactionTarget, ReactionType};
    use std::collections::HashMap;

    /// A peer that serves from its own trie and message map, and merges by
    /// inserting into both.
    struct TestPeer {
        engine: SyncEngine,
        messages: Mutex<HashMap<SyncId, Message>>,
        withhold: AtomicBool,
    }

    impl TestPeer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                engine: SyncEngine::new(SyncConfig::default()),
                messages: Mutex::new(HashMap::new()),
                withhold: AtomicBool::new(false),
            })
        }

        fn add(&self, message: Message) {
            let id = message.sync_id();
            self.engine.trie().write().insert(&id).unwrap();
            self.messages.lock().unwrap().insert(id, message);
        }
    }

    #[async_trait]
    impl SyncServer for TestPeer {
        async fn sync_snapshot(&self) -> Result<Snapshot> {
            Ok(self.engine.snapshot_at(NOW))
        }

        async fn sync_metadata_by_prefix(&self, prefix: &[u8]) -> Result<TrieNodeMetadata> {
            Ok(self
                .engine
                .trie()
                .read()
                .get_node_metadata(prefix)
                .unwrap_or_else(|| TrieNodeMetadata::empty(prefix)))
        }

        async fn sync_ids_by_prefix(&self, prefix: &[u8]) -> Result<Vec<SyncId>> {
            Ok(self
                .engine
                .trie()
                .read()
                .sync_ids_by_prefix(prefix, MAX_SYNC_IDS_PER_PREFIX))
        }

        async fn messages_by_ids(&self, ids: &[SyncId]) -> Result<Vec<Message>> {
            if self.withhold.load(Ordering::SeqCst) {
                return Ok(Vec::new());
            }
            let messages = self.messages.lock().unwrap();
            Ok(ids.iter().filter_map(|id| messages.get(id).cloned()).collect())
        }
    }

    #[async_trait]
    impl MessageMerger for TestPeer {
        async fn merge_message(&self, message: Message) -> MergeStatus {
            if self.engine.trie().read().exists(&message.sync_id()) {
                return MergeStatus::NoOp;
            }
            self.add(message);
            MergeStatus::Merged
        }
    }

    const NOW: u32 = 1_000_000;

    fn like(fid: u64, ts: u32, target: &str) -> Message {
        MessageBuilder::reaction(
            Fid(fid),
            MessageType::ReactionAdd,
            ReactionType::Like,
            ReactionTarget::Url(target.into()),
        )
        .timestamp(ts)
        .build()
        .unwrap()
    }

    fn client_for(peer: &Arc<TestPeer>, id: u8) -> MemoryPeerClient {
        MemoryPeerClient::new(PeerId::from_bytes([id; 32]), peer.clone())
    }

    #[tokio::test]
    async fn test_perform_sync_fetches_missing() {
        let local = TestPeer::new();
        let remote = TestPeer::new();
        for i in 0..20u32 {
            let m = like(1, 1_000 + i * 100, &format!("https://x/{}", i));
            remote.add(m.clone());
            if i % 2 == 0 {
                local.add(m);
            }
        }

        let client = client_for(&remote, 2);
        let result = local
            .engine
            .perform_sync(vec![Vec::new()], &client, local.as_ref())
            .await;
        assert_eq!(result.success_count, 10);
        assert_eq!(result.failed_count, 0);
        assert_eq!(
            local.engine.trie().read().root_digest(),
            remote.engine.trie().read().root_digest()
        );
    }

    #[tokio::test]
    async fn test_descends_when_node_is_large() {
        let local = TestPeer::new();
        let remote = TestPeer::new();
        for i in 0..200u32 {
            remote.add(like(i as u64 + 1, 5_000 + i * 300, "https://y"));
        }
        let config = SyncConfig {
            hashes_per_fetch: 4,
            ..SyncConfig::default()
        };
        let engine = SyncEngine::with_trie(config, local.engine.trie().clone());
        let client = client_for(&remote, 3);
        let result = engine
            .perform_sync(vec![Vec::new()], &client, local.as_ref())
            .await;
        assert_eq!(result.success_count, 200);
        assert_eq!(local.engine.trie().read().items(), 200);
    }

    #[tokio::test]
    async fn test_sync_with_peer_reports_to_scorer() {
        let local = TestPeer::new();
        let remote = TestPeer::new();
        for i in 0..5u32 {
            remote.add(like(9, 100 + i, &format!("https://z/{}", i)));
        }
        let client = client_for(&remote, 4);
        let result = local
            .engine
            .sync_with_peer(&client, local.as_ref())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.success_count, 5);
        let score = local.engine.scorer().score(&client.peer_id()).unwrap();
        assert_eq!(score.score, 1);
        assert!(!local.engine.is_syncing());
    }

    #[tokio::test]
    async fn test_withheld_messages_count_toward_total() {
        let local = TestPeer::new();
        let remote = TestPeer::new();
        for i in 0..1200u32 {
            remote.add(like(i as u64 + 1, 1_000 + i, "https://w"));
        }
        remote.withhold.store(true, Ordering::SeqCst);
        let client = client_for(&remote, 9);

        for _ in 0..3 {
            let result = local
                .engine
                .sync_with_peer(&client, local.as_ref())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(result.total, 1200);
            assert_eq!(result.success_count, 0);
            assert_eq!(result.deferred_count, 0);
        }
        assert!(local.engine.trie().read().is_empty());

        let score = local.engine.scorer().score(&client.peer_id()).unwrap();
        assert!(score.score <= crate::peer_score::BLOCK_THRESHOLD);
        assert_eq!(local.engine.scorer().get_bad_peer_ids(), vec![client.peer_id()]);
        assert!(matches!(
            local.engine.sync_with_peer(&client, local.as_ref()).await,
            Err(SyncError::PeerBlocked(_))
        ));
    }

    #[tokio::test]
    async fn test_unrequested_messages_are_ignored() {
        let local = TestPeer::new();
        let remote = TestPeer::new();
        let wanted = like(1, 10, "a");
        remote.add(wanted.clone());
        let client = client_for(&remote, 10);

        let stray = like(2, 20, "b");
        remote.messages.lock().unwrap().insert(wanted.sync_id(), stray);
        let result = local
            .engine
            .perform_sync(vec![Vec::new()], &client, local.as_ref())
            .await;
        assert_eq!(result.total, 1);
        assert_eq!(result.success_count, 0);
        assert!(local.engine.trie().read().is_empty());
    }

    #[tokio::test]
    async fn test_should_sync_false_while_active() {
        let engine = SyncEngine::new(SyncConfig::default());
        let _guard = engine.try_begin(PeerId::from_bytes([7; 32])).unwrap();
        assert!(!engine.should_sync_at(&[], u64::MAX, NOW));
        assert!(engine.try_begin(PeerId::from_bytes([8; 32])).is_none());
    }

    #[tokio::test]
    async fn test_should_sync_by_count() {
        let engine = SyncEngine::new(SyncConfig::default());
        engine.trie().write().insert(&like(1, 10, "a").sync_id()).unwrap();
        engine.trie().write().insert(&like(1, 20, "b").sync_id()).unwrap();

        let foreign = vec![[0x11; 20]; 4];
        assert!(engine.should_sync_at(&foreign, 3, NOW));
        assert!(!engine.should_sync_at(&foreign, 1, NOW));

        let local = engine.snapshot_at(NOW);
        assert!(!engine.should_sync_at(&local.excluded_hashes, 100, NOW));
    }

    #[tokio::test]
    async fn test_identical_peer_in_previous_bucket_never_syncs() {
        let engine = SyncEngine::new(SyncConfig::default());
        for i in 0..4u32 {
            let id = like(1, NOW - 35 + i * 10, &format!("https://s/{}", i)).sync_id();
            engine.trie().write().insert(&id).unwrap();
        }
        let peer = Snapshot::compute(&engine.trie().read(), NOW - 5);
        for _ in 0..100 {
            assert!(!engine.should_sync_at(&peer.excluded_hashes, peer.num_messages, NOW));
        }
    }

    #[tokio::test]
    async fn test_equal_counts_reach_both_outcomes() {
        let engine = SyncEngine::new(SyncConfig::default());
        engine.trie().write().insert(&like(1, 10, "a").sync_id()).unwrap();
        let foreign = vec![[0x22; 20]; 4];
        let outcomes: HashSet<bool> = (0..200)
            .map(|_| engine.should_sync_at(&foreign, 1, NOW))
            .collect();
        assert_eq!(outcomes.len(), 2);
    }

    #[tokio::test]
    async fn test_rpc_timeout_counts_as_failure() {
        let local = TestPeer::new();
        let remote = TestPeer::new();
        remote.add(like(1, 10, "a"));
        let config = SyncConfig {
            rpc_timeout_ms: 20,
            ..SyncConfig::default()
        };
        let engine = SyncEngine::with_trie(config, local.engine.trie().clone());
        let client = client_for(&remote, 5).with_latency(Duration::from_millis(200));
        let result = engine
            .perform_sync(vec![Vec::new()], &client, local.as_ref())
            .await;
        assert_eq!(result.failed_count, 1);
        assert_eq!(result.success_count, 0);
    }

    #[tokio::test]
    async fn test_stop_refuses_new_passes() {
        let local = TestPeer::new();
        let remote = TestPeer::new();
        let client = client_for(&remote, 6);
        assert!(local.engine.stop().await);
        assert!(matches!(
            local.engine.sync_with_peer(&client, local.as_ref()).await,
            Err(SyncError::Cancelled)
        ));
        local.engine.resume();
        assert!(local.engine.sync_with_peer(&client, local.as_ref()).await.is_ok());
    }

    #[test]
    fn test_shared_trie_as_index() {
        let trie = SharedTrie::new();
        let id = like(1, 10, "a").sync_id();
        trie.insert_sync_id(id).unwrap();
        assert!(trie.read().exists(&id));
        trie.delete_sync_id(id).unwrap();
        assert!(trie.read().is_empty());
    }
}
