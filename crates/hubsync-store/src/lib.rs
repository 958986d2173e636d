//! # hubsync store
//!
//! Persistence and the CRDT merge engine for a hub.
//!
//! ## Overview
//!
//! Rows live in an ordered key-value space behind the [`KvStore`] trait.
//! [`EntityStore`] implements the add-set/remove-set CRDT for one message
//! family on top of it, and [`StoreSet`] holds one per family. Every
//! mutation is committed through [`StoreEventHandler`], which persists a
//! [`HubEvent`] in the same batch and keeps the sync index in step.
//!
//! ## Key Types
//!
//! - [`KvStore`] - Async ordered key-value trait
//! - [`SqliteKv`] - SQLite-based persistent storage
//! - [`MemoryKv`] - In-memory storage for tests
//! - [`EntityStore`] - Per-family merge, prune and revoke
//! - [`MergeOutcome`] - Result of merging a message
//! - [`MessageIndex`] - Derived index updated on every commit
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hubsync_store::{SqliteKv, StoreEventHandler, StoreSet};
//!
//! async fn example() {
//!     let kv = Arc::new(SqliteKv::open("hub.db").unwrap());
//!     let handler = Arc::new(StoreEventHandler::open(kv).await.unwrap());
//!     let _stores = StoreSet::new(handler);
//!     // let outcome = stores.merge(&message).await.unwrap();
//! }
//! ```

pub mod entity_store;
pub mod error;
pub mod event;
pub mod event_handler;
pub mod kv;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod store_set;

pub use entity_store::{EntityStore, MergeOutcome};
pub use error::{Result, StoreError};
pub use event::{HubEvent, HubEventBody, HubEventIdGenerator};
pub use event_handler::{MessageIndex, StoreEventHandler};
pub use kv::{BatchOp, KvStore, WriteBatch};
pub use memory::MemoryKv;
pub use sqlite::SqliteKv;
pub use store_set::StoreSet;
