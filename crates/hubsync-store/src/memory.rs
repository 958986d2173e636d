//! In-memory implementation of the KvStore trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use hubsync_core::keys::prefix_successor;

use crate::error::{Result, StoreError};
use crate::kv::{BatchOp, KvStore, WriteBatch};

/// In-memory key-value store.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryKv {
    inner: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    unavailable: AtomicBool,
}

impl MemoryKv {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store offline".into()))
        } else {
            Ok(())
        }
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Internal(format!("lock poisoned: {}", e))
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.check_available()?;
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.get(key).cloned())
    }

    async fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        self.check_available()?;
        let mut inner = self.inner.write().map_err(poisoned)?;
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { key, value } => {
                    inner.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    inner.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.check_available()?;
        let inner = self.inner.read().map_err(poisoned)?;
        let upper = match prefix_successor(prefix) {
            Some(end) => Bound::Excluded(end),
            None => Bound::Unbounded,
        };
        Ok(inner
            .range((Bound::Included(prefix.to_vec()), upper))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
