//! KvStore trait: the ordered, byte-keyed persistence collaborator.
//!
//! Everything above this layer (entity stores, hub events) is expressed in
//! terms of prefix scans and atomic batches over opaque keys. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;

use crate::error::Result;

/// A single mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// An ordered list of puts and deletes committed atomically.
///
/// Later ops win over earlier ops on the same key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Put {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) -> &mut Self {
        self.ops.push(BatchOp::Delete { key: key.into() });
        self
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// The KvStore trait: async interface over an ordered key space.
///
/// # Design Notes
///
/// - **Atomic batches**: `write_batch` applies every op or none.
/// - **Ordered scans**: `scan_prefix` returns rows in ascending key order.
/// - **No silent failure**: backend errors are returned as-is so callers never
///   believe a write landed when it did not.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read one key.
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Apply a batch atomically.
    async fn write_batch(&self, batch: WriteBatch) -> Result<()>;

    /// All rows whose key starts with `prefix`, ascending.
    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Write a single key.
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write_batch(batch).await
    }

    /// Delete a single key. Missing keys are not an error.
    async fn delete(&self, key: &[u8]) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write_batch(batch).await
    }
}
