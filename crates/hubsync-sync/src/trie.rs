//! MerkleTrie: a syncable summary of every admitted SyncId.
//!
//! The trie branches on one SyncId byte per level and always has full
//! depth, so the node for a prefix covers exactly the ids starting with that
//! prefix and its digest depends on nothing else. Nodes live in an arena
//! (`Vec<Node>` plus a free list) and refer to children by index.
//!
//! Digests:
//! - leaf: `hash160(sync_id)`
//! - branch: `hash160(child digests concatenated in byte order)`
//! - empty root: `hash160(b"")`

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use hubsync_core::{hash160, Hasher160, SyncId, HASH_LENGTH, SYNC_ID_LENGTH, TIMESTAMP_LENGTH};

use crate::error::{Result, SyncError};

/// Depth of every leaf.
pub const TRIE_DEPTH: usize = SYNC_ID_LENGTH;

/// Cap on ids returned for one prefix.
pub const MAX_SYNC_IDS_PER_PREFIX: usize = 1024;

pub type Digest = [u8; HASH_LENGTH];

/// Digest of an empty trie.
pub fn empty_digest() -> Digest {
    hash160(b"")
}

/// Count and digest of one child, as advertised to peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrieNodeSummary {
    pub num_messages: u64,
    pub digest: Digest,
}

/// A node and its immediate children, as advertised to peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrieNodeMetadata {
    pub prefix: Vec<u8>,
    pub num_messages: u64,
    pub digest: Digest,
    pub children: BTreeMap<u8, TrieNodeSummary>,
}

impl TrieNodeMetadata {
    /// Metadata for a prefix with nothing under it.
    pub fn empty(prefix: &[u8]) -> Self {
        Self {
            prefix: prefix.to_vec(),
            num_messages: 0,
            digest: empty_digest(),
            children: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    Inserted,
    AlreadyPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteResult {
    Deleted,
    NotPresent,
}

/// Outcome of comparing one local node with a peer's metadata for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeDiff {
    /// Same digest; nothing to do at or below this prefix.
    Identical,
    /// Digests differ above leaf level.
    Divergent {
        /// Child prefixes the peer has and whose summaries differ from ours.
        remote: Vec<Vec<u8>>,
        /// Child prefixes only we have.
        local_only: Vec<Vec<u8>>,
    },
    /// Leaf level: the peer has this id and we do not.
    MissingLocally(SyncId),
    /// Leaf level: we have this id and the peer does not.
    MissingRemotely(SyncId),
}

/// Result of a full local reconciliation between two tries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrieDiff {
    pub missing_locally: Vec<SyncId>,
    pub missing_remotely: Vec<SyncId>,
}

#[derive(Debug, Clone)]
struct Node {
    children: BTreeMap<u8, usize>,
    items: u64,
    digest: Digest,
}

impl Node {
    fn empty() -> Self {
        Self {
            children: BTreeMap::new(),
            items: 0,
            digest: empty_digest(),
        }
    }
}

const ROOT: usize = 0;

#[derive(Debug, Clone)]
pub struct MerkleTrie {
    nodes: Vec<Node>,
    free: Vec<usize>,
    generation: u64,
}

impl Default for MerkleTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl MerkleTrie {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::empty()],
            free: Vec::new(),
            generation: 0,
        }
    }

    /// Number of ids stored.
    pub fn items(&self) -> u64 {
        self.nodes[ROOT].items
    }

    pub fn is_empty(&self) -> bool {
        self.items() == 0
    }

    pub fn root_digest(&self) -> Digest {
        self.nodes[ROOT].digest
    }

    /// Bumped on every successful mutation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn alloc(&mut self) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = Node::empty();
                idx
            }
            None => {
                self.nodes.push(Node::empty());
                self.nodes.len() - 1
            }
        }
    }

    fn release(&mut self, idx: usize) {
        self.nodes[idx].children.clear();
        self.free.push(idx);
    }

    fn recompute(&mut self, idx: usize) {
        let node = &self.nodes[idx];
        let mut hasher = Hasher160::new();
        let mut items = 0;
        for child in node.children.values() {
            hasher.update(&self.nodes[*child].digest);
            items += self.nodes[*child].items;
        }
        let digest = hasher.finalize();
        let node = &mut self.nodes[idx];
        node.digest = digest;
        node.items = items;
    }

    fn find(&self, prefix: &[u8]) -> Option<usize> {
        let mut idx = ROOT;
        for byte in prefix {
            idx = *self.nodes[idx].children.get(byte)?;
        }
        Some(idx)
    }

    /// Insert an id. Inserting a present id changes nothing.
    pub fn insert(&mut self, id: &SyncId) -> Result<InsertResult> {
        let key = id.as_bytes();
        let mut path = Vec::with_capacity(TRIE_DEPTH + 1);
        path.push(ROOT);
        let mut created = false;
        let mut idx = ROOT;
        for byte in key {
            idx = match self.nodes[idx].children.get(byte).copied() {
                Some(child) => child,
                None => {
                    let child = self.alloc();
                    self.nodes[idx].children.insert(*byte, child);
                    created = true;
                    child
                }
            };
            path.push(idx);
        }
        if !created {
            return Ok(InsertResult::AlreadyPresent);
        }

        let leaf = &mut self.nodes[idx];
        leaf.items = 1;
        leaf.digest = hash160(key);
        for node in path.iter().rev().skip(1) {
            self.recompute(*node);
        }
        self.generation += 1;
        self.check_path(key)?;
        Ok(InsertResult::Inserted)
    }

    /// Remove an id. Removing an absent id is a no-op.
    pub fn delete(&mut self, id: &SyncId) -> Result<DeleteResult> {
        let key = id.as_bytes();
        let mut path = Vec::with_capacity(TRIE_DEPTH + 1);
        path.push(ROOT);
        let mut idx = ROOT;
        for byte in key {
            match self.nodes[idx].children.get(byte).copied() {
                Some(child) => idx = child,
                None => return Ok(DeleteResult::NotPresent),
            }
            path.push(idx);
        }

        // Walk back up, detaching nodes left without children.
        for depth in (0..TRIE_DEPTH).rev() {
            let parent = path[depth];
            let child = path[depth + 1];
            let child_empty = depth + 1 == TRIE_DEPTH || self.nodes[child].children.is_empty();
            if child_empty {
                self.nodes[parent].children.remove(&key[depth]);
                self.release(child);
            }
            self.recompute(parent);
        }
        self.generation += 1;
        self.check_path(key)?;
        Ok(DeleteResult::Deleted)
    }

    pub fn exists(&self, id: &SyncId) -> bool {
        self.find(id.as_bytes()).is_some()
    }

    /// Verify digest and count of every node along `key`'s path.
    fn check_path(&self, key: &[u8]) -> Result<()> {
        let mut idx = ROOT;
        let mut depth = 0;
        loop {
            let node = &self.nodes[idx];
            if depth < TRIE_DEPTH {
                let mut hasher = Hasher160::new();
                let mut items = 0;
                for child in node.children.values() {
                    hasher.update(&self.nodes[*child].digest);
                    items += self.nodes[*child].items;
                }
                if hasher.finalize() != node.digest || items != node.items {
                    return Err(SyncError::InvariantViolation {
                        prefix: hex::encode(&key[..depth]),
                        detail: format!(
                            "stored items {} digest {}, children sum to {}",
                            node.items,
                            hex::encode(node.digest),
                            items
                        ),
                    });
                }
            }
            if depth == key.len() {
                return Ok(());
            }
            match node.children.get(&key[depth]) {
                Some(child) => idx = *child,
                None => return Ok(()),
            }
            depth += 1;
        }
    }

    /// Full structural check of every node. Used after rebuilds and in tests.
    pub fn verify(&self) -> Result<()> {
        let mut stack = vec![(ROOT, Vec::new())];
        while let Some((idx, prefix)) = stack.pop() {
            let node = &self.nodes[idx];
            if prefix.len() == TRIE_DEPTH {
                if node.items != 1 || node.digest != hash160(&prefix) {
                    return Err(SyncError::InvariantViolation {
                        prefix: hex::encode(&prefix),
                        detail: "bad leaf".into(),
                    });
                }
                continue;
            }
            self.check_path(&prefix)?;
            for (byte, child) in &node.children {
                let mut child_prefix = prefix.clone();
                child_prefix.push(*byte);
                stack.push((*child, child_prefix));
            }
        }
        Ok(())
    }

    /// Metadata for the node at `prefix`, or `None` if nothing is there.
    pub fn get_node_metadata(&self, prefix: &[u8]) -> Option<TrieNodeMetadata> {
        if prefix.len() > TRIE_DEPTH {
            return None;
        }
        let idx = self.find(prefix)?;
        let node = &self.nodes[idx];
        let children = node
            .children
            .iter()
            .map(|(byte, child)| {
                let child = &self.nodes[*child];
                (
                    *byte,
                    TrieNodeSummary {
                        num_messages: child.items,
                        digest: child.digest,
                    },
                )
            })
            .collect();
        Some(TrieNodeMetadata {
            prefix: prefix.to_vec(),
            num_messages: node.items,
            digest: node.digest,
            children,
        })
    }

    /// Ids under `prefix` in ascending order, at most `limit`.
    pub fn sync_ids_by_prefix(&self, prefix: &[u8], limit: usize) -> Vec<SyncId> {
        let mut out = Vec::new();
        let Some(start) = self.find(prefix) else {
            return out;
        };
        // Depth-first, pushing children in reverse so the smallest pops first.
        let mut stack = vec![(start, prefix.to_vec())];
        while let Some((idx, path)) = stack.pop() {
            if out.len() >= limit {
                break;
            }
            if path.len() == TRIE_DEPTH {
                if let Ok(id) = SyncId::try_from(path.as_slice()) {
                    out.push(id);
                }
                continue;
            }
            for (byte, child) in self.nodes[idx].children.iter().rev() {
                let mut next = path.clone();
                next.push(*byte);
                stack.push((*child, next));
            }
        }
        out
    }

    /// Every id, ascending.
    pub fn all_sync_ids(&self) -> Vec<SyncId> {
        self.sync_ids_by_prefix(&[], usize::MAX)
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.nodes = vec![Node::empty()];
        self.free.clear();
        self.generation += 1;
    }

    /// Replace the contents with exactly `ids`.
    pub fn rebuild<I>(&mut self, ids: I) -> Result<()>
    where
        I: IntoIterator<Item = SyncId>,
    {
        self.clear();
        for id in ids {
            self.insert(&id)?;
        }
        self.verify()
    }

    /// Digest the trie would have if it held only ids with `timestamp < ts`.
    pub fn digest_before(&self, ts: u32) -> Digest {
        let bound = ts.to_be_bytes();
        self.digest_below(ROOT, 0, &bound).unwrap_or_else(empty_digest)
    }

    fn digest_below(&self, idx: usize, depth: usize, bound: &[u8; TIMESTAMP_LENGTH]) -> Option<Digest> {
        if depth == TIMESTAMP_LENGTH {
            // Timestamp equals the bound: excluded.
            return None;
        }
        let mut hasher = Hasher160::new();
        let mut any = false;
        for (byte, child) in &self.nodes[idx].children {
            let digest = match byte.cmp(&bound[depth]) {
                std::cmp::Ordering::Less => Some(self.nodes[*child].digest),
                std::cmp::Ordering::Equal => self.digest_below(*child, depth + 1, bound),
                std::cmp::Ordering::Greater => None,
            };
            if let Some(digest) = digest {
                hasher.update(&digest);
                any = true;
            }
        }
        any.then(|| hasher.finalize())
    }

    /// Compare our node at `remote.prefix` with the peer's metadata for it.
    pub fn diff_node(&self, remote: &TrieNodeMetadata) -> NodeDiff {
        let local = self
            .get_node_metadata(&remote.prefix)
            .unwrap_or_else(|| TrieNodeMetadata::empty(&remote.prefix));
        if local.digest == remote.digest && local.num_messages == remote.num_messages {
            return NodeDiff::Identical;
        }

        if remote.prefix.len() == TRIE_DEPTH {
            if let Ok(id) = SyncId::try_from(remote.prefix.as_slice()) {
                return match (local.num_messages > 0, remote.num_messages > 0) {
                    (false, true) => NodeDiff::MissingLocally(id),
                    (true, false) => NodeDiff::MissingRemotely(id),
                    _ => NodeDiff::Identical,
                };
            }
        }

        let child_prefix = |byte: u8| {
            let mut p = remote.prefix.clone();
            p.push(byte);
            p
        };
        let remote_divergent = remote
            .children
            .iter()
            .filter(|(byte, summary)| local.children.get(*byte) != Some(*summary))
            .map(|(byte, _)| child_prefix(*byte))
            .collect();
        let local_only = local
            .children
            .keys()
            .filter(|byte| !remote.children.contains_key(*byte))
            .map(|byte| child_prefix(*byte))
            .collect();
        NodeDiff::Divergent {
            remote: remote_divergent,
            local_only,
        }
    }

    /// Full reconciliation against another trie, computed locally.
    pub fn diff(&self, other: &MerkleTrie) -> TrieDiff {
        let mut result = TrieDiff::default();
        let mut stack: Vec<Vec<u8>> = vec![Vec::new()];
        while let Some(prefix) = stack.pop() {
            let Some(remote) = other.get_node_metadata(&prefix) else {
                result
                    .missing_remotely
                    .extend(self.sync_ids_by_prefix(&prefix, usize::MAX));
                continue;
            };
            if self.find(&prefix).is_none() {
                result
                    .missing_locally
                    .extend(other.sync_ids_by_prefix(&prefix, usize::MAX));
                continue;
            }
            match self.diff_node(&remote) {
                NodeDiff::Identical => {}
                NodeDiff::Divergent { remote, local_only } => {
                    stack.extend(remote);
                    for prefix in local_only {
                        result
                            .missing_remotely
                            .extend(self.sync_ids_by_prefix(&prefix, usize::MAX));
                    }
                }
                NodeDiff::MissingLocally(id) => result.missing_locally.push(id),
                NodeDiff::MissingRemotely(id) => result.missing_remotely.push(id),
            }
        }
        result.missing_locally.sort();
        result.missing_remotely.sort();
        result
    }
}
