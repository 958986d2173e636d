//! Convergence checks.
//!
//! Two hubs have converged when their tries hold the same ids. A hub is
//! internally consistent when its trie holds exactly the ids of the rows in
//! its stores.

use std::collections::BTreeSet;

use hubsync_core::SyncId;
use hubsync_store::StoreSet;

use crate::error::Result;
use crate::trie::MerkleTrie;

/// Result of convergence verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// Both sides hold identical id sets.
    Converged,
    /// The sides differ.
    Diverged {
        /// Ids only the other side holds.
        missing_locally: Vec<SyncId>,
        /// Ids only this side holds.
        missing_remotely: Vec<SyncId>,
    },
}

impl ConvergenceResult {
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceResult::Converged)
    }

    fn from_sets(local: &BTreeSet<SyncId>, other: &BTreeSet<SyncId>) -> Self {
        if local == other {
            return ConvergenceResult::Converged;
        }
        ConvergenceResult::Diverged {
            missing_locally: other.difference(local).copied().collect(),
            missing_remotely: local.difference(other).copied().collect(),
        }
    }
}

/// Compare two tries by root digest, falling back to a full local diff.
pub fn compare_tries(local: &MerkleTrie, remote: &MerkleTrie) -> ConvergenceResult {
    if local.root_digest() == remote.root_digest() && local.items() == remote.items() {
        return ConvergenceResult::Converged;
    }
    let diff = local.diff(remote);
    ConvergenceResult::Diverged {
        missing_locally: diff.missing_locally,
        missing_remotely: diff.missing_remotely,
    }
}

/// Check that `trie` holds exactly the ids of every row in `stores`.
///
/// `missing_locally` lists rows the trie lacks; `missing_remotely` lists
/// trie ids with no row behind them.
pub async fn verify_trie_matches_store(
    trie: &MerkleTrie,
    stores: &StoreSet,
) -> Result<ConvergenceResult> {
    let in_trie: BTreeSet<SyncId> = trie.all_sync_ids().into_iter().collect();
    let in_store: BTreeSet<SyncId> = stores.all_sync_ids().await?.into_iter().collect();
    let result = ConvergenceResult::from_sets(&in_trie, &in_store);
    if !result.is_converged() {
        tracing::error!("trie and store disagree");
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubsync_core::{Fid, MessageBuilder};
    use hubsync_store::{MemoryKv, StoreEventHandler};
    use std::sync::Arc;

    use crate::engine::SharedTrie;

    #[test]
    fn test_compare_tries() {
        let mut a = MerkleTrie::new();
        let mut b = MerkleTrie::new();
        assert!(compare_tries(&a, &b).is_converged());

        let m = MessageBuilder::cast_add(Fid(1), "hi")
            .timestamp(10)
            .build()
            .unwrap();
        a.insert(&m.sync_id()).unwrap();
        match compare_tries(&a, &b) {
            ConvergenceResult::Diverged {
                missing_locally,
                missing_remotely,
            } => {
                assert!(missing_locally.is_empty());
                assert_eq!(missing_remotely, vec![m.sync_id()]);
            }
            other => panic!("unexpected {:?}", other),
        }
        b.insert(&m.sync_id()).unwrap();
        assert!(compare_tries(&a, &b).is_converged());
    }

    #[tokio::test]
    async fn test_trie_follows_store_commits() {
        let trie = SharedTrie::new();
        let handler = Arc::new(StoreEventHandler::new(Arc::new(MemoryKv::default())));
        handler.set_index(Arc::new(trie.clone()));
        let stores = StoreSet::new(handler);

        for i in 0..5u32 {
            let m = MessageBuilder::cast_add(Fid(3), format!("cast {}", i))
                .timestamp(100 + i)
                .build()
                .unwrap();
            stores.merge(&m).await.unwrap();
        }
        let snapshot = trie.read().clone();
        assert_eq!(snapshot.items(), 5);
        assert!(verify_trie_matches_store(&snapshot, &stores)
            .await
            .unwrap()
            .is_converged());

        let stale = MerkleTrie::new();
        match verify_trie_matches_store(&stale, &stores).await.unwrap() {
            ConvergenceResult::Diverged {
                missing_locally, ..
            } => assert_eq!(missing_locally.len(), 5),
            other => panic!("unexpected {:?}", other),
        }
    }
}
