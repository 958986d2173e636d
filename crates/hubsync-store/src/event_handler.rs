//! StoreEventHandler: the single commit point for store mutations.
//!
//! Every merge, prune and revoke goes through [`StoreEventHandler::commit`],
//! which under one lock assigns an event id, persists the event alongside the
//! row changes in one batch, applies the change to the sync index and then
//! broadcasts it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::{broadcast, Mutex};

use hubsync_core::keys::{hub_event_id, hub_event_key, HUB_EVENT_PREFIX};
use hubsync_core::time::now_millis;
use hubsync_core::SyncId;

use crate::error::{Result, StoreError};
use crate::event::{HubEvent, HubEventBody, HubEventIdGenerator};
use crate::kv::{KvStore, WriteBatch};

/// Default capacity of the broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// A derived index kept in lockstep with the stored rows (the Merkle trie).
pub trait MessageIndex: Send + Sync {
    fn insert_sync_id(&self, id: SyncId) -> Result<()>;

    /// Must be a no-op for ids that are not present.
    fn delete_sync_id(&self, id: SyncId) -> Result<()>;

    /// Apply the row changes an event describes.
    fn apply(&self, event: &HubEvent) -> Result<()> {
        match &event.body {
            HubEventBody::MergeMessage {
                message,
                deleted_messages,
            } => {
                for deleted in deleted_messages {
                    self.delete_sync_id(deleted.sync_id())?;
                }
                self.insert_sync_id(message.sync_id())
            }
            HubEventBody::PruneMessage { message } | HubEventBody::RevokeMessage { message } => {
                self.delete_sync_id(message.sync_id())
            }
        }
    }
}

pub struct StoreEventHandler {
    kv: Arc<dyn KvStore>,
    index: RwLock<Option<Arc<dyn MessageIndex>>>,
    ids: Mutex<HubEventIdGenerator>,
    sender: broadcast::Sender<HubEvent>,
    needs_rebuild: AtomicBool,
}

impl StoreEventHandler {
    /// Create a handler with a fresh id generator.
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self::with_generator(kv, HubEventIdGenerator::new())
    }

    /// Create a handler that continues after the last persisted event.
    pub async fn open(kv: Arc<dyn KvStore>) -> Result<Self> {
        let rows = kv.scan_prefix(&[HUB_EVENT_PREFIX]).await?;
        let generator = match rows.last() {
            Some((key, _)) => HubEventIdGenerator::resume_after(hub_event_id(key)?),
            None => HubEventIdGenerator::new(),
        };
        Ok(Self::with_generator(kv, generator))
    }

    fn with_generator(kv: Arc<dyn KvStore>, generator: HubEventIdGenerator) -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        Self {
            kv,
            index: RwLock::new(None),
            ids: Mutex::new(generator),
            sender,
            needs_rebuild: AtomicBool::new(false),
        }
    }

    /// Register the index that mirrors committed rows.
    pub fn set_index(&self, index: Arc<dyn MessageIndex>) {
        if let Ok(mut slot) = self.index.write() {
            *slot = Some(index);
        }
    }

    /// The underlying key-value store.
    pub fn kv(&self) -> &Arc<dyn KvStore> {
        &self.kv
    }

    /// Persist `batch` plus the event row, then index and broadcast the event.
    ///
    /// Storage failures are returned and nothing is indexed or broadcast.
    pub async fn commit(&self, mut batch: WriteBatch, body: HubEventBody) -> Result<HubEvent> {
        let mut ids = self.ids.lock().await;
        let id = ids.generate(now_millis())?;
        let event = HubEvent { id, body };
        batch.put(hub_event_key(id), event.to_cbor()?);

        self.kv.write_batch(batch).await?;

        let index = self
            .index
            .read()
            .map_err(|e| StoreError::Internal(format!("lock poisoned: {}", e)))?
            .clone();
        if let Some(index) = index {
            if let Err(e) = index.apply(&event) {
                tracing::error!(
                    event_id = id,
                    kind = event.body.kind(),
                    error = %e,
                    "index update failed, trie needs rebuild"
                );
                self.needs_rebuild.store(true, Ordering::SeqCst);
            }
        }

        tracing::trace!(event_id = id, kind = event.body.kind(), "event committed");
        // No subscribers is fine.
        let _ = self.sender.send(event.clone());
        Ok(event)
    }

    /// Receive events committed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.sender.subscribe()
    }

    /// Persisted events with id greater than `after_id`, ascending.
    pub async fn events_since(&self, after_id: u64) -> Result<Vec<HubEvent>> {
        let rows = self.kv.scan_prefix(&[HUB_EVENT_PREFIX]).await?;
        let mut events = Vec::new();
        for (key, value) in rows {
            if hub_event_id(&key)? > after_id {
                events.push(HubEvent::from_cbor(&value)?);
            }
        }
        Ok(events)
    }

    /// Drop persisted events with id below `before_id`. Returns how many.
    pub async fn prune_events(&self, before_id: u64) -> Result<usize> {
        let rows = self.kv.scan_prefix(&[HUB_EVENT_PREFIX]).await?;
        let mut batch = WriteBatch::new();
        for (key, _) in rows {
            if hub_event_id(&key)? < before_id {
                batch.delete(key);
            }
        }
        let count = batch.len();
        self.kv.write_batch(batch).await?;
        Ok(count)
    }

    /// True when an index update failed since the last rebuild.
    pub fn needs_rebuild(&self) -> bool {
        self.needs_rebuild.load(Ordering::SeqCst)
    }

    /// Flag the index as untrustworthy, e.g. after a storage failure.
    pub fn mark_needs_rebuild(&self) {
        self.needs_rebuild.store(true, Ordering::SeqCst);
    }

    pub fn clear_needs_rebuild(&self) {
        self.needs_rebuild.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKv;
    use hubsync_core::{Fid, MessageBuilder};
    use std::collections::BTreeSet;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct SetIndex {
        ids: StdMutex<BTreeSet<SyncId>>,
        fail: AtomicBool,
    }

    impl MessageIndex for SetIndex {
        fn insert_sync_id(&self, id: SyncId) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Index("boom".into()));
            }
            self.ids.lock().unwrap().insert(id);
            Ok(())
        }

        fn delete_sync_id(&self, id: SyncId) -> Result<()> {
            self.ids.lock().unwrap().remove(&id);
            Ok(())
        }
    }

    fn merge_body(ts: u32) -> HubEventBody {
        HubEventBody::MergeMessage {
            message: MessageBuilder::cast_add(Fid(1), "x").timestamp(ts).build().unwrap(),
            deleted_messages: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_commit_persists_indexes_and_broadcasts() {
        let kv = Arc::new(MemoryKv::new());
        let handler = StoreEventHandler::new(kv.clone());
        let index = Arc::new(SetIndex::default());
        handler.set_index(index.clone());
        let mut rx = handler.subscribe();

        let event = handler.commit(WriteBatch::new(), merge_body(1)).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), event);
        assert_eq!(index.ids.lock().unwrap().len(), 1);
        assert_eq!(handler.events_since(0).await.unwrap(), vec![event.clone()]);
        assert!(handler.events_since(event.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_skips_index() {
        let kv = Arc::new(MemoryKv::new());
        let handler = StoreEventHandler::new(kv.clone());
        let index = Arc::new(SetIndex::default());
        handler.set_index(index.clone());

        kv.set_unavailable(true);
        let err = handler.commit(WriteBatch::new(), merge_body(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(index.ids.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_index_failure_flags_rebuild() {
        let kv = Arc::new(MemoryKv::new());
        let handler = StoreEventHandler::new(kv.clone());
        let index = Arc::new(SetIndex::default());
        index.fail.store(true, Ordering::SeqCst);
        handler.set_index(index);

        handler.commit(WriteBatch::new(), merge_body(1)).await.unwrap();
        assert!(handler.needs_rebuild());
        handler.clear_needs_rebuild();
        assert!(!handler.needs_rebuild());
    }

    #[tokio::test]
    async fn test_open_resumes_ids() {
        let kv: Arc<MemoryKv> = Arc::new(MemoryKv::new());
        let first = StoreEventHandler::new(kv.clone())
            .commit(WriteBatch::new(), merge_body(1))
            .await
            .unwrap();

        let reopened = StoreEventHandler::open(kv.clone()).await.unwrap();
        let second = reopened.commit(WriteBatch::new(), merge_body(2)).await.unwrap();
        assert!(second.id > first.id);

        assert_eq!(reopened.prune_events(second.id).await.unwrap(), 1);
        assert_eq!(reopened.events_since(0).await.unwrap().len(), 1);
    }
}
