//! SQLite implementation of the KvStore trait.
//!
//! This is the primary storage backend for a hub. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use hubsync_core::keys::prefix_successor;

use crate::error::{Result, StoreError};
use crate::kv::{BatchOp, KvStore, WriteBatch};
use crate::migration;

/// SQLite-based key-value store.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
#[derive(Clone)]
pub struct SqliteKv {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKv {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation against the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Internal(format!("mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Internal(format!("spawn_blocking failed: {}", e)))?
    }
}

#[async_trait]
impl KvStore for SqliteKv {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let key = key.to_vec();
        self.run(move |conn| {
            conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.run(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut put = tx.prepare_cached(
                    "INSERT INTO kv (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                )?;
                let mut delete = tx.prepare_cached("DELETE FROM kv WHERE key = ?1")?;
                for op in batch.ops() {
                    match op {
                        BatchOp::Put { key, value } => {
                            put.execute(params![key, value])?;
                        }
                        BatchOp::Delete { key } => {
                            delete.execute(params![key])?;
                        }
                    }
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let start = prefix.to_vec();
        let end = prefix_successor(prefix);
        self.run(move |conn| {
            let rows = match end {
                Some(end) => {
                    let mut stmt = conn.prepare_cached(
                        "SELECT key, value FROM kv WHERE key >= ?1 AND key < ?2 ORDER BY key",
                    )?;
                    let rows = stmt
                        .query_map(params![start, end], |row| Ok((row.get(0)?, row.get(1)?)))?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    rows
                }
                None => {
                    let mut stmt = conn
                        .prepare_cached("SELECT key, value FROM kv WHERE key >= ?1 ORDER BY key")?;
                    let rows = stmt
                        .query_map(params![start], |row| Ok((row.get(0)?, row.get(1)?)))?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    rows
                }
            };
            Ok(rows)
        })
        .await
    }
}
