//! The Hub: stores, trie and sync engine behind one API.
//!
//! Wiring, in commit order: a message merged by a family store is written
//! through the [`StoreEventHandler`], which updates the shared trie and then
//! broadcasts the event. The sync engine reads the same trie.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use hubsync_core::time::{now_millis, NETWORK_EPOCH_MS};
use hubsync_core::{CoreError, Family, Fid, Message, SignerKey, SyncId};
use hubsync_store::event::make_event_id;
use hubsync_store::{
    HubEvent, KvStore, MemoryKv, MergeOutcome, SqliteKv, StoreError, StoreEventHandler, StoreSet,
};
use hubsync_sync::{
    MergeResult, MergeStatus, MessageMerger, PeerClient, PeerId, SharedTrie, Snapshot,
    SyncEngine, SyncServer, TrieNodeMetadata,
};

use crate::config::HubConfig;
use crate::error::{HubError, Result};
use crate::signer::SignerRegistry;

pub struct Hub {
    config: HubConfig,
    stores: StoreSet,
    engine: SyncEngine,
    signers: Arc<dyn SignerRegistry>,
}

impl Hub {
    /// Wire a hub over `kv`. The trie starts empty.
    pub async fn new(
        config: HubConfig,
        kv: Arc<dyn KvStore>,
        signers: Arc<dyn SignerRegistry>,
    ) -> Result<Self> {
        config.validate()?;
        let trie = SharedTrie::new();
        let handler = Arc::new(StoreEventHandler::open(kv).await?);
        handler.set_index(Arc::new(trie.clone()));

        let stores = Family::ALL.iter().fold(StoreSet::new(handler), |set, family| {
            set.with_prune_limit(*family, config.prune_limits.get(*family))
        });
        let engine = SyncEngine::with_trie(config.sync.clone(), trie);

        Ok(Self {
            config,
            stores,
            engine,
            signers,
        })
    }

    /// Wire a hub over existing rows and rebuild the trie from them.
    pub async fn open(
        config: HubConfig,
        kv: Arc<dyn KvStore>,
        signers: Arc<dyn SignerRegistry>,
    ) -> Result<Self> {
        let hub = Self::new(config, kv, signers).await?;
        hub.rebuild_trie().await?;
        Ok(hub)
    }

    /// Open the backend named by `config.db_path` (in memory when unset).
    pub async fn from_config(config: HubConfig, signers: Arc<dyn SignerRegistry>) -> Result<Self> {
        let kv: Arc<dyn KvStore> = match &config.db_path {
            Some(path) => Arc::new(SqliteKv::open(path)?),
            None => Arc::new(MemoryKv::default()),
        };
        Self::open(config, kv, signers).await
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn stores(&self) -> &StoreSet {
        &self.stores
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    fn handler(&self) -> &Arc<StoreEventHandler> {
        self.stores.handler()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Submission
    // ─────────────────────────────────────────────────────────────────────────

    /// Merge a message from any source: local submission, gossip or sync.
    pub async fn submit_message(&self, message: Message) -> Result<MergeOutcome> {
        message.check_shape()?;
        if message.data.compute_hash()? != message.hash {
            return Err(CoreError::MalformedMessage("hash does not match data".into()).into());
        }
        if message.data.network != self.config.network {
            return Err(HubError::WrongNetwork {
                expected: self.config.network,
                actual: message.data.network,
            });
        }
        if !self.signers.is_active(message.fid(), &message.signer) {
            return Err(HubError::UnknownSigner { fid: message.fid() });
        }

        match self.stores.merge(&message).await {
            Ok(outcome) => {
                tracing::debug!(
                    fid = %message.fid(),
                    sync_id = %message.sync_id(),
                    merged = outcome.is_merged(),
                    "message submitted"
                );
                Ok(outcome)
            }
            Err(e) => {
                if matches!(e, StoreError::Unavailable(_) | StoreError::Database(_) | StoreError::Io(_)) {
                    tracing::error!(error = %e, "storage failure during merge, trie will be rebuilt");
                    self.handler().mark_needs_rebuild();
                }
                Err(e.into())
            }
        }
    }

    /// Deregister a signer and revoke everything it signed.
    ///
    /// Returns the number of rows removed.
    pub async fn remove_signer(&self, fid: Fid, signer: &SignerKey) -> Result<usize> {
        if !self.signers.remove_signer(fid, signer) {
            tracing::debug!(fid = %fid, "signer was not registered");
        }
        let revoked = self.stores.revoke_signer(fid, signer).await?;
        tracing::info!(fid = %fid, revoked, "signer removed");
        Ok(revoked)
    }

    /// Prune every owner to its family limits. Returns rows pruned.
    pub async fn prune_messages(&self) -> Result<usize> {
        let pruned = self.stores.prune_everything().await?;
        if pruned > 0 {
            tracing::info!(pruned, "pruned messages");
        }
        Ok(pruned)
    }

    /// Drop persisted events older than the configured retention.
    ///
    /// Returns the number of events removed.
    pub async fn prune_events(&self) -> Result<usize> {
        self.prune_events_at(now_millis()).await
    }

    /// As [`prune_events`](Self::prune_events) with an explicit clock.
    pub async fn prune_events_at(&self, now_ms: i64) -> Result<usize> {
        let retention_ms = i64::try_from(self.config.event_retention_secs.saturating_mul(1000))
            .unwrap_or(i64::MAX);
        let cutoff = now_ms.saturating_sub(retention_ms).saturating_sub(NETWORK_EPOCH_MS);
        if cutoff <= 0 {
            return Ok(0);
        }
        let pruned = self
            .handler()
            .prune_events(make_event_id(cutoff as u64, 0))
            .await?;
        if pruned > 0 {
            tracing::info!(pruned, "pruned hub events");
        }
        Ok(pruned)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries and events
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn get_all_messages_by_fid(&self, fid: Fid) -> Result<Vec<Message>> {
        let mut out = Vec::new();
        for store in self.stores.stores() {
            out.extend(store.get_all_messages_by_fid(fid).await?);
        }
        Ok(out)
    }

    pub async fn get_messages_by_sync_ids(&self, ids: &[SyncId]) -> Result<Vec<Message>> {
        Ok(self.stores.get_messages_by_sync_ids(ids).await?)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.handler().subscribe()
    }

    pub async fn events_since(&self, after_id: u64) -> Result<Vec<HubEvent>> {
        Ok(self.handler().events_since(after_id).await?)
    }

    pub fn num_messages(&self) -> u64 {
        self.engine.trie().read().items()
    }

    pub fn root_digest(&self) -> [u8; 20] {
        self.engine.trie().read().root_digest()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Trie recovery
    // ─────────────────────────────────────────────────────────────────────────

    /// Rebuild the trie from every stored row.
    ///
    /// Merges committed while the rows are being read may be missed; run
    /// with submissions quiesced.
    pub async fn rebuild_trie(&self) -> Result<()> {
        let ids = self.stores.all_sync_ids().await?;
        let count = ids.len();
        self.engine.trie().write().rebuild(ids)?;
        self.handler().clear_needs_rebuild();
        tracing::info!(messages = count, "trie rebuilt");
        Ok(())
    }

    pub fn needs_rebuild(&self) -> bool {
        self.handler().needs_rebuild()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync
    // ─────────────────────────────────────────────────────────────────────────

    /// Run one sync pass against `client`.
    ///
    /// A pending trie rebuild runs first.
    pub async fn sync_with_peer(&self, client: &dyn PeerClient) -> Result<Option<MergeResult>> {
        if self.needs_rebuild() {
            self.rebuild_trie().await?;
        }
        Ok(self.engine.sync_with_peer(client, self).await?)
    }

    /// Peers whose score fell to the block threshold.
    pub fn bad_peers(&self) -> Vec<PeerId> {
        self.engine.scorer().get_bad_peer_ids()
    }

    /// Stop syncing. Returns false if a pass did not unwind in time.
    pub async fn stop(&self) -> bool {
        self.engine.stop().await
    }
}

#[async_trait]
impl MessageMerger for Hub {
    async fn merge_message(&self, message: Message) -> MergeStatus {
        match self.submit_message(message).await {
            Ok(MergeOutcome::Merged { .. }) => MergeStatus::Merged,
            Ok(_) => MergeStatus::NoOp,
            Err(HubError::UnknownSigner { .. }) => MergeStatus::Deferred,
            Err(HubError::Store(e)) => MergeStatus::from_store_error(&e),
            Err(e) => {
                tracing::debug!(error = %e, "synced message rejected");
                MergeStatus::Failed
            }
        }
    }
}

#[async_trait]
impl SyncServer for Hub {
    async fn sync_snapshot(&self) -> hubsync_sync::Result<Snapshot> {
        self.engine.snapshot()
    }

    async fn sync_metadata_by_prefix(&self, prefix: &[u8]) -> hubsync_sync::Result<TrieNodeMetadata> {
        Ok(self
            .engine
            .trie()
            .read()
            .get_node_metadata(prefix)
            .unwrap_or_else(|| TrieNodeMetadata::empty(prefix)))
    }

    async fn sync_ids_by_prefix(&self, prefix: &[u8]) -> hubsync_sync::Result<Vec<SyncId>> {
        Ok(self
            .engine
            .trie()
            .read()
            .sync_ids_by_prefix(prefix, hubsync_sync::limits::MAX_SYNC_IDS))
    }

    async fn messages_by_ids(&self, ids: &[SyncId]) -> hubsync_sync::Result<Vec<Message>> {
        Ok(self.stores.get_messages_by_sync_ids(ids).await?)
    }
}
