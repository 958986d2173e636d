//! # hubsync
//!
//! A hub node: per-family CRDT message stores kept in step with a Merkle
//! trie, and an anti-entropy sync engine that reconciles the trie with
//! peers.
//!
//! ## Overview
//!
//! - **Messages** belong to a family (casts, reactions, links, ...). Within
//!   a family each owner has at most one live row per logical key; conflicts
//!   resolve deterministically (remove beats add, then later timestamp, then
//!   greater hash).
//! - **The trie** summarises every live row's `SyncId`. It is derived state
//!   and can be rebuilt from the stores at any time.
//! - **Sync** compares snapshots with a peer, descends only into divergent
//!   subtrees, and merges fetched messages through the normal submit path.
//! - **Peer scoring** penalises peers that waste sync effort.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hubsync::{Hub, HubConfig, MemorySignerRegistry};
//! use hubsync::core::{Fid, MessageBuilder, SignerKey};
//!
//! async fn example() {
//!     let signers = Arc::new(MemorySignerRegistry::new());
//!     signers.add_signer(Fid(1), SignerKey::from_bytes([0; 32]));
//!
//!     let hub = Hub::from_config(HubConfig::default(), signers).await.unwrap();
//!     let message = MessageBuilder::cast_add(Fid(1), "hello").build().unwrap();
//!     hub.submit_message(message).await.unwrap();
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `hubsync::core` - Messages, families, ids and hashing
//! - `hubsync::store` - Key-value backends and the CRDT stores
//! - `hubsync::sync` - Trie, sync engine and peer scoring

pub mod config;
pub mod error;
pub mod hub;
pub mod signer;
pub mod telemetry;

// Re-export component crates
pub use hubsync_core as core;
pub use hubsync_store as store;
pub use hubsync_sync as sync;

pub use config::{HubConfig, PruneLimits};
pub use error::{HubError, Result};
pub use hub::Hub;
pub use signer::{MemorySignerRegistry, SignerRegistry};

pub use hubsync_core::{Family, Fid, Message, MessageBuilder, MessageType, SyncId};
pub use hubsync_store::{HubEvent, HubEventBody, MergeOutcome};
pub use hubsync_sync::{MergeResult, PeerId, SyncConfig};
