//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use hubsync::{Hub, HubConfig, MemorySignerRegistry};
use hubsync_core::{
    Fid, Message, MessageBuilder, MessageHash, MessageType, ReactionTarget, ReactionType,
    SignerKey, UserDataType,
};
use hubsync_store::{MemoryKv, StoreEventHandler, StoreSet};
use hubsync_sync::{MemoryPeerClient, PeerId, SharedTrie};

/// An owner with a signer and a timestamp cursor.
///
/// Every `make_*` call uses the cursor; `at` moves it.
pub struct TestFixture {
    pub fid: Fid,
    pub signer: SignerKey,
    pub timestamp: u32,
}

impl TestFixture {
    /// An owner signing with the all-zero key, starting at timestamp 1000.
    pub fn new(fid: u64) -> Self {
        Self {
            fid: Fid(fid),
            signer: SignerKey::from_bytes([0u8; 32]),
            timestamp: 1_000,
        }
    }

    /// Use a deterministic signer derived from `seed`.
    pub fn with_signer_seed(mut self, seed: u8) -> Self {
        self.signer = SignerKey::from_bytes([seed; 32]);
        self
    }

    /// Move the timestamp cursor.
    pub fn at(&mut self, timestamp: u32) -> &mut Self {
        self.timestamp = timestamp;
        self
    }

    fn finish(&self, builder: MessageBuilder) -> Message {
        builder
            .timestamp(self.timestamp)
            .signer(self.signer)
            .build()
            .unwrap()
    }

    pub fn make_cast_add(&self, text: &str) -> Message {
        self.finish(MessageBuilder::cast_add(self.fid, text))
    }

    pub fn make_cast_remove(&self, target: MessageHash) -> Message {
        self.finish(MessageBuilder::cast_remove(self.fid, target))
    }

    pub fn make_like(&self, url: &str) -> Message {
        self.finish(MessageBuilder::reaction(
            self.fid,
            MessageType::ReactionAdd,
            ReactionType::Like,
            ReactionTarget::Url(url.into()),
        ))
    }

    pub fn make_unlike(&self, url: &str) -> Message {
        self.finish(MessageBuilder::reaction(
            self.fid,
            MessageType::ReactionRemove,
            ReactionType::Like,
            ReactionTarget::Url(url.into()),
        ))
    }

    pub fn make_follow(&self, target: u64) -> Message {
        self.finish(MessageBuilder::link(
            self.fid,
            MessageType::LinkAdd,
            "follow",
            Fid(target),
        ))
    }

    pub fn make_unfollow(&self, target: u64) -> Message {
        self.finish(MessageBuilder::link(
            self.fid,
            MessageType::LinkRemove,
            "follow",
            Fid(target),
        ))
    }

    pub fn make_user_data(&self, field: UserDataType, value: &str) -> Message {
        self.finish(MessageBuilder::user_data(self.fid, field, value))
    }
}

/// Fixtures for owners `1..=count`, each with its own signer.
pub fn multi_party_fixtures(count: usize) -> Vec<TestFixture> {
    (1..=count)
        .map(|i| TestFixture::new(i as u64).with_signer_seed(i as u8))
        .collect()
}

/// A store set over memory with the trie wired in as its index.
pub fn memory_stores() -> (StoreSet, SharedTrie) {
    let trie = SharedTrie::new();
    let handler = Arc::new(StoreEventHandler::new(Arc::new(MemoryKv::default())));
    handler.set_index(Arc::new(trie.clone()));
    (StoreSet::new(handler), trie)
}

/// An in-memory hub that accepts every fixture's signer.
pub async fn test_hub(fixtures: &[TestFixture], config: HubConfig) -> Arc<Hub> {
    let signers = Arc::new(MemorySignerRegistry::new());
    for fixture in fixtures {
        signers.add_signer(fixture.fid, fixture.signer);
    }
    let hub = Hub::new(config, Arc::new(MemoryKv::default()), signers)
        .await
        .unwrap();
    Arc::new(hub)
}

/// A loopback client that calls into `hub` as peer `id`.
pub fn connect(hub: &Arc<Hub>, id: u8) -> MemoryPeerClient {
    MemoryPeerClient::new(PeerId::from_bytes([id; 32]), hub.clone())
}
