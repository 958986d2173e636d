//! StoreSet: one [`EntityStore`] per family behind a single entry point.

use std::collections::BTreeSet;
use std::sync::Arc;

use hubsync_core::{Family, Fid, Message, SignerKey, SyncId};

use crate::entity_store::{resolve_sync_id, EntityStore, MergeOutcome};
use crate::error::{Result, StoreError};
use crate::event_handler::StoreEventHandler;

pub struct StoreSet {
    stores: Vec<EntityStore>,
    handler: Arc<StoreEventHandler>,
}

impl StoreSet {
    /// One store per family, each with its default prune limit.
    pub fn new(handler: Arc<StoreEventHandler>) -> Self {
        let stores = Family::ALL
            .iter()
            .map(|family| EntityStore::new(*family, handler.clone()))
            .collect();
        Self { stores, handler }
    }

    /// Override the prune limit of one family.
    pub fn with_prune_limit(mut self, family: Family, limit: usize) -> Self {
        let idx = self.position(family);
        let store = self.stores.remove(idx);
        self.stores.insert(idx, store.with_prune_limit(limit));
        self
    }

    fn position(&self, family: Family) -> usize {
        family.to_u8() as usize - 1
    }

    pub fn store(&self, family: Family) -> &EntityStore {
        &self.stores[self.position(family)]
    }

    pub fn stores(&self) -> impl Iterator<Item = &EntityStore> {
        self.stores.iter()
    }

    pub fn handler(&self) -> &Arc<StoreEventHandler> {
        &self.handler
    }

    /// Route a message to its family's store.
    pub async fn merge(&self, message: &Message) -> Result<MergeOutcome> {
        self.store(Family::of(message.message_type()))
            .merge(message)
            .await
    }

    /// Revoke a signer across every family. Returns the number of rows removed.
    pub async fn revoke_signer(&self, fid: Fid, signer: &SignerKey) -> Result<usize> {
        let mut total = 0;
        for store in &self.stores {
            total += store.revoke_signer(fid, signer).await?.len();
        }
        Ok(total)
    }

    /// Prune every family for `fid` to its limit. Returns rows pruned.
    pub async fn prune_all(&self, fid: Fid) -> Result<usize> {
        let mut total = 0;
        for store in &self.stores {
            total += store.prune_to_limit(fid).await?.len();
        }
        Ok(total)
    }

    /// Prune every owner in every family. Returns rows pruned.
    pub async fn prune_everything(&self) -> Result<usize> {
        let mut total = 0;
        for store in &self.stores {
            for fid in store.all_fids().await? {
                total += store.prune_to_limit(fid).await?.len();
            }
        }
        Ok(total)
    }

    /// Fetch messages by SyncId, skipping ids that are not stored.
    pub async fn get_messages_by_sync_ids(&self, ids: &[SyncId]) -> Result<Vec<Message>> {
        let kv = self.handler.kv();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(row_key) = resolve_sync_id(kv.as_ref(), id).await? else {
                continue;
            };
            if let Some(bytes) = kv.get(&row_key).await? {
                out.push(
                    Message::from_cbor(&bytes)
                        .map_err(|e| StoreError::Serialization(e.to_string()))?,
                );
            }
        }
        Ok(out)
    }

    /// Every stored SyncId, across all families and owners.
    pub async fn all_sync_ids(&self) -> Result<Vec<SyncId>> {
        let mut ids = Vec::new();
        for store in &self.stores {
            ids.extend(store.all_sync_ids().await?);
        }
        Ok(ids)
    }

    /// Owners with rows in any family.
    pub async fn all_fids(&self) -> Result<BTreeSet<Fid>> {
        let mut fids = BTreeSet::new();
        for store in &self.stores {
            fids.extend(store.all_fids().await?);
        }
        Ok(fids)
    }
}
