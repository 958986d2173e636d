//! EntityStore: the add-set/remove-set CRDT for one message family.
//!
//! One generic implementation serves every family; the [`FamilyDescriptor`]
//! supplies the logical key shape, the add/remove message types and the
//! prune limit.
//!
//! # Merge
//!
//! For a given `(fid, logical key)` at most one add row and one remove row
//! exist. An incoming message is ranked against them with
//! [`hubsync_core::compare`]: if either existing row ranks at least as high,
//! the merge is a no-op; otherwise the outranked rows are deleted and the
//! incoming row inserted in a single batch, committed with its event.
//!
//! # Locking
//!
//! Merge, prune and revoke for one owner are serialised by an async mutex
//! picked from a fixed stripe by fid, so the read-decide-write sequence never
//! interleaves. Owners sharing a stripe simply wait for each other.

use std::cmp::Ordering;
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use hubsync_core::keys::{
    self, message_key, message_prefix, set_index_key, set_index_prefix, signer_key,
    signer_prefix, sync_id_index_key, sync_id_suffix, MESSAGE_MARKER, OWNER_PREFIX_LENGTH,
};
use hubsync_core::{
    compare, CoreError, Family, FamilyDescriptor, Fid, Message, SetKind, SignerKey, SyncId,
};

use crate::error::{Result, StoreError};
use crate::event::{HubEvent, HubEventBody};
use crate::event_handler::StoreEventHandler;
use crate::kv::{KvStore, WriteBatch};

/// Result of merging a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The message was admitted. `deleted` holds the rows it displaced.
    Merged { event_id: u64, deleted: Vec<Message> },
    /// The exact message is already stored.
    Duplicate,
    /// A stored row for the same logical key outranks the message.
    Superseded,
}

impl MergeOutcome {
    pub fn is_merged(&self) -> bool {
        matches!(self, MergeOutcome::Merged { .. })
    }
}

fn invalid(e: CoreError) -> StoreError {
    StoreError::InvalidArgument(e.to_string())
}

fn decode_message(bytes: &[u8]) -> Result<Message> {
    Message::from_cbor(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

pub struct EntityStore {
    descriptor: &'static FamilyDescriptor,
    prune_limit: usize,
    handler: Arc<StoreEventHandler>,
    locks: Vec<Mutex<()>>,
}

/// Number of owner lock stripes per store.
pub const LOCK_STRIPES: usize = 256;

impl EntityStore {
    /// Create a store for `family` using the family's default prune limit.
    pub fn new(family: Family, handler: Arc<StoreEventHandler>) -> Self {
        let descriptor = family.descriptor();
        Self {
            descriptor,
            prune_limit: descriptor.prune_limit,
            handler,
            locks: (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Override the prune limit.
    pub fn with_prune_limit(mut self, limit: usize) -> Self {
        self.prune_limit = limit;
        self
    }

    pub fn family(&self) -> Family {
        self.descriptor.family
    }

    pub fn prune_limit(&self) -> usize {
        self.prune_limit
    }

    fn kv(&self) -> &Arc<dyn KvStore> {
        self.handler.kv()
    }

    async fn lock_fid(&self, fid: Fid) -> MutexGuard<'_, ()> {
        self.locks[lock_stripe(fid)].lock().await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Admit a message into the add or remove set.
    ///
    /// Storage errors are propagated unchanged. A malformed message is an
    /// [`StoreError::InvalidArgument`].
    pub async fn merge(&self, message: &Message) -> Result<MergeOutcome> {
        let family = self.family();
        if Family::of(message.message_type()) != family {
            return Err(invalid(CoreError::FamilyMismatch {
                family,
                message_type: message.message_type(),
            }));
        }
        message.check_shape().map_err(invalid)?;
        let kind = family.kind_of(message.message_type()).map_err(invalid)?;
        let logical_key = family.logical_key(message).map_err(invalid)?;
        let fid = message.fid();
        let incoming = message.sync_id();

        let _guard = self.lock_fid(fid).await;

        let existing_add = self.lookup_index(fid, SetKind::Add, &logical_key).await?;
        let existing_remove = match self.descriptor.remove_type {
            Some(_) => self.lookup_index(fid, SetKind::Remove, &logical_key).await?,
            None => None,
        };

        let mut outranked = Vec::new();
        for (existing_kind, existing) in [
            (SetKind::Add, existing_add),
            (SetKind::Remove, existing_remove),
        ] {
            let Some(existing) = existing else { continue };
            match compare(existing_kind, &existing, kind, &incoming) {
                Ordering::Equal => return Ok(MergeOutcome::Duplicate),
                Ordering::Greater => {
                    tracing::trace!(%fid, family = self.descriptor.name, "merge superseded");
                    return Ok(MergeOutcome::Superseded);
                }
                Ordering::Less => outranked.push((existing_kind, existing)),
            }
        }

        if kind == SetKind::Add && existing_add.is_none() {
            self.check_prunable(fid, &incoming).await?;
        }

        let mut batch = WriteBatch::new();
        let mut deleted = Vec::with_capacity(outranked.len());
        for (existing_kind, existing) in outranked {
            match self.get_by_sync_id(fid, &existing).await? {
                Some(old) => {
                    self.delete_row(&mut batch, &old, existing_kind, &logical_key);
                    deleted.push(old);
                }
                None => {
                    // Index without a row; drop the dangling index entry.
                    tracing::warn!(%fid, sync_id = ?existing, "index points at missing row");
                    batch.delete(set_index_key(family, fid, existing_kind, &logical_key));
                }
            }
        }
        self.put_row(&mut batch, message, kind, &logical_key)?;

        let event = self
            .handler
            .commit(
                batch,
                HubEventBody::MergeMessage {
                    message: message.clone(),
                    deleted_messages: deleted.clone(),
                },
            )
            .await?;

        tracing::debug!(
            %fid,
            family = self.descriptor.name,
            sync_id = ?incoming,
            replaced = deleted.len(),
            "message merged"
        );
        Ok(MergeOutcome::Merged {
            event_id: event.id,
            deleted,
        })
    }

    /// Drop the oldest add rows until at most `limit` remain for `fid`.
    ///
    /// Remove rows are never touched. Returns one event per pruned row.
    pub async fn prune(&self, fid: Fid, limit: usize) -> Result<Vec<HubEvent>> {
        let _guard = self.lock_fid(fid).await;

        let mut entries = self.index_entries(fid, SetKind::Add).await?;
        if entries.len() <= limit {
            return Ok(Vec::new());
        }
        entries.sort_by(|a, b| a.1.cmp(&b.1));
        let excess = entries.len() - limit;

        let mut events = Vec::with_capacity(excess);
        for (index_key, id) in entries.into_iter().take(excess) {
            let Some(message) = self.get_by_sync_id(fid, &id).await? else {
                // Index without a row; dropping it is enough to get under the limit.
                tracing::warn!(%fid, sync_id = ?id, "index points at missing row");
                self.kv().delete(&index_key).await?;
                continue;
            };
            let logical_key = self.family().logical_key(&message).map_err(invalid)?;
            let mut batch = WriteBatch::new();
            self.delete_row(&mut batch, &message, SetKind::Add, &logical_key);
            events.push(
                self.handler
                    .commit(batch, HubEventBody::PruneMessage { message })
                    .await?,
            );
        }

        tracing::info!(%fid, family = self.descriptor.name, pruned = events.len(), "pruned");
        Ok(events)
    }

    /// Prune down to this store's configured limit.
    pub async fn prune_to_limit(&self, fid: Fid) -> Result<Vec<HubEvent>> {
        self.prune(fid, self.prune_limit).await
    }

    /// Delete every row for `fid` authored by `signer`. Idempotent.
    pub async fn revoke_signer(&self, fid: Fid, signer: &SignerKey) -> Result<Vec<HubEvent>> {
        let _guard = self.lock_fid(fid).await;

        let rows = self
            .kv()
            .scan_prefix(&signer_prefix(self.family(), fid, signer))
            .await?;

        let mut events = Vec::with_capacity(rows.len());
        for (key, _) in rows {
            let id = sync_id_suffix(&key)?;
            let Some(message) = self.get_by_sync_id(fid, &id).await? else {
                // Row already gone; clean the stale signer entry.
                self.kv().delete(&key).await?;
                continue;
            };
            let kind = self
                .family()
                .kind_of(message.message_type())
                .map_err(invalid)?;
            let logical_key = self.family().logical_key(&message).map_err(invalid)?;
            let mut batch = WriteBatch::new();
            self.delete_row(&mut batch, &message, kind, &logical_key);
            events.push(
                self.handler
                    .commit(batch, HubEventBody::RevokeMessage { message })
                    .await?,
            );
        }

        if !events.is_empty() {
            tracing::info!(
                %fid,
                family = self.descriptor.name,
                %signer,
                revoked = events.len(),
                "signer revoked"
            );
        }
        Ok(events)
    }

    fn put_row(
        &self,
        batch: &mut WriteBatch,
        message: &Message,
        kind: SetKind,
        logical_key: &[u8],
    ) -> Result<()> {
        let family = self.family();
        let fid = message.fid();
        let id = message.sync_id();
        let row_key = message_key(family, fid, &id);
        batch
            .put(row_key.clone(), message.to_cbor().map_err(invalid)?)
            .put(set_index_key(family, fid, kind, logical_key), id.as_bytes().to_vec())
            .put(signer_key(family, fid, &message.signer, &id), Vec::new())
            .put(sync_id_index_key(&id), row_key);
        Ok(())
    }

    fn delete_row(
        &self,
        batch: &mut WriteBatch,
        message: &Message,
        kind: SetKind,
        logical_key: &[u8],
    ) {
        let family = self.family();
        let fid = message.fid();
        let id = message.sync_id();
        batch
            .delete(message_key(family, fid, &id))
            .delete(set_index_key(family, fid, kind, logical_key))
            .delete(signer_key(family, fid, &message.signer, &id))
            .delete(sync_id_index_key(&id));
    }

    async fn check_prunable(&self, fid: Fid, incoming: &SyncId) -> Result<()> {
        let ids = self.index_ids(fid, SetKind::Add).await?;
        if ids.len() < self.prune_limit {
            return Ok(());
        }
        match ids.iter().min() {
            Some(oldest) if incoming < oldest => Err(StoreError::Prunable {
                fid: fid.0,
                limit: self.prune_limit,
            }),
            _ => Ok(()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Readers
    // ─────────────────────────────────────────────────────────────────────────

    async fn lookup_index(
        &self,
        fid: Fid,
        kind: SetKind,
        logical_key: &[u8],
    ) -> Result<Option<SyncId>> {
        let key = set_index_key(self.family(), fid, kind, logical_key);
        match self.kv().get(&key).await? {
            Some(bytes) => Ok(Some(SyncId::try_from(bytes.as_slice())?)),
            None => Ok(None),
        }
    }

    async fn index_entries(&self, fid: Fid, kind: SetKind) -> Result<Vec<(Vec<u8>, SyncId)>> {
        let rows = self
            .kv()
            .scan_prefix(&set_index_prefix(self.family(), fid, kind))
            .await?;
        rows.into_iter()
            .map(|(k, v)| {
                let id = SyncId::try_from(v.as_slice()).map_err(StoreError::from)?;
                Ok((k, id))
            })
            .collect()
    }

    async fn index_ids(&self, fid: Fid, kind: SetKind) -> Result<Vec<SyncId>> {
        Ok(self
            .index_entries(fid, kind)
            .await?
            .into_iter()
            .map(|(_, id)| id)
            .collect())
    }

    async fn load_all(&self, fid: Fid, mut ids: Vec<SyncId>) -> Result<Vec<Message>> {
        ids.sort();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(message) = self.get_by_sync_id(fid, &id).await? {
                out.push(message);
            }
        }
        Ok(out)
    }

    /// The stored add for a logical key, if any.
    pub async fn get_add(&self, fid: Fid, logical_key: &[u8]) -> Result<Option<Message>> {
        match self.lookup_index(fid, SetKind::Add, logical_key).await? {
            Some(id) => self.get_by_sync_id(fid, &id).await,
            None => Ok(None),
        }
    }

    /// The stored remove for a logical key, if any.
    pub async fn get_remove(&self, fid: Fid, logical_key: &[u8]) -> Result<Option<Message>> {
        match self.lookup_index(fid, SetKind::Remove, logical_key).await? {
            Some(id) => self.get_by_sync_id(fid, &id).await,
            None => Ok(None),
        }
    }

    /// All add rows for `fid`, oldest first.
    pub async fn get_adds_by_fid(&self, fid: Fid) -> Result<Vec<Message>> {
        let ids = self.index_ids(fid, SetKind::Add).await?;
        self.load_all(fid, ids).await
    }

    /// All remove rows for `fid`, oldest first.
    pub async fn get_removes_by_fid(&self, fid: Fid) -> Result<Vec<Message>> {
        let ids = self.index_ids(fid, SetKind::Remove).await?;
        self.load_all(fid, ids).await
    }

    /// Every row for `fid` in SyncId order.
    pub async fn get_all_messages_by_fid(&self, fid: Fid) -> Result<Vec<Message>> {
        let rows = self
            .kv()
            .scan_prefix(&message_prefix(self.family(), fid))
            .await?;
        rows.iter().map(|(_, v)| decode_message(v)).collect()
    }

    pub async fn get_by_sync_id(&self, fid: Fid, id: &SyncId) -> Result<Option<Message>> {
        match self.kv().get(&message_key(self.family(), fid, id)).await? {
            Some(bytes) => Ok(Some(decode_message(&bytes)?)),
            None => Ok(None),
        }
    }

    /// SyncIds of every row in this family, across all owners.
    pub async fn all_sync_ids(&self) -> Result<Vec<SyncId>> {
        let rows = self.kv().scan_prefix(&[self.family().to_u8()]).await?;
        let mut ids = Vec::new();
        for (key, _) in rows {
            if key.len() > OWNER_PREFIX_LENGTH && key[OWNER_PREFIX_LENGTH - 1] == MESSAGE_MARKER {
                ids.push(sync_id_suffix(&key)?);
            }
        }
        Ok(ids)
    }

    /// Owners with at least one row in this family.
    pub async fn all_fids(&self) -> Result<Vec<Fid>> {
        let rows = self.kv().scan_prefix(&[self.family().to_u8()]).await?;
        let mut fids: Vec<Fid> = Vec::new();
        for (key, _) in rows {
            if key.len() < OWNER_PREFIX_LENGTH {
                return Err(CoreError::MalformedKey("short owner key".into()).into());
            }
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&key[1..9]);
            let fid = Fid(u64::from_be_bytes(raw));
            if fids.last() != Some(&fid) {
                fids.push(fid);
            }
        }
        Ok(fids)
    }

    /// Number of add rows for `fid`.
    pub async fn count_adds(&self, fid: Fid) -> Result<usize> {
        Ok(self.index_ids(fid, SetKind::Add).await?.len())
    }
}

fn lock_stripe(fid: Fid) -> usize {
    (fid.0 % LOCK_STRIPES as u64) as usize
}

/// Row key for `id` as recorded in the global SyncId index.
pub async fn resolve_sync_id(kv: &dyn KvStore, id: &SyncId) -> Result<Option<Vec<u8>>> {
    kv.get(&keys::sync_id_index_key(id)).await
}
