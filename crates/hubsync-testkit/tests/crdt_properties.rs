//! CRDT properties of the family stores, checked through the trie as well.

use std::collections::BTreeSet;
use std::future::Future;

use proptest::prelude::*;

use hubsync_core::{compare, Family, Fid, Message, MessageHash, SetKind, SyncId, UserDataType};
use hubsync_store::{MergeOutcome, StoreSet};
use hubsync_sync::{verify_trie_matches_store, SharedTrie};
use hubsync_testkit::fixtures::{memory_stores, TestFixture};
use hubsync_testkit::generators::{key_op_message, message_from_params, KeyOp, MessageParams};

fn run<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

/// Final state of the store and trie after merging `messages` in order.
async fn merge_all(messages: &[Message]) -> (BTreeSet<SyncId>, [u8; 20]) {
    let (stores, trie) = memory_stores();
    for m in messages {
        stores.merge(m).await.unwrap();
    }
    let ids = stores.all_sync_ids().await.unwrap().into_iter().collect();
    let root = trie.read().root_digest();
    (ids, root)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn merge_order_does_not_matter(
        (ops, shuffled) in prop::collection::vec(any::<KeyOp>(), 1..8)
            .prop_flat_map(|ops| (Just(ops.clone()), Just(ops).prop_shuffle()))
    ) {
        let a: Vec<Message> = ops.iter().map(key_op_message).collect();
        let b: Vec<Message> = shuffled.iter().map(key_op_message).collect();
        let (ids_a, root_a) = run(merge_all(&a));
        let (ids_b, root_b) = run(merge_all(&b));
        prop_assert_eq!(ids_a.len(), 1);
        prop_assert_eq!(ids_a, ids_b);
        prop_assert_eq!(root_a, root_b);
    }

    #[test]
    fn merging_twice_is_a_no_op(ops in prop::collection::vec(any::<KeyOp>(), 1..8)) {
        let messages: Vec<Message> = ops.iter().map(key_op_message).collect();
        let mut doubled = messages.clone();
        doubled.extend(messages.iter().cloned());
        prop_assert_eq!(run(merge_all(&messages)), run(merge_all(&doubled)));
    }

    #[test]
    fn trie_matches_store_after_merge_prune_revoke(
        params in prop::collection::vec(any::<MessageParams>(), 1..40),
        revoked in 1u64..=4,
    ) {
        run(async {
            let (stores, trie) = memory_stores();
            let stores = stores
                .with_prune_limit(Family::Cast, 2)
                .with_prune_limit(Family::Reaction, 2);
            for p in &params {
                // Prunable and outranked messages are expected here.
                let _ = stores.merge(&message_from_params(p)).await;
            }
            stores.prune_everything().await.unwrap();
            stores
                .revoke_signer(Fid(revoked), &TestFixture::new(revoked).signer)
                .await
                .unwrap();

            assert_agrees(&stores, &trie).await;
        });
    }
}

async fn assert_agrees(stores: &StoreSet, trie: &SharedTrie) {
    let snapshot = trie.read().clone();
    snapshot.verify().unwrap();
    let result = verify_trie_matches_store(&snapshot, stores).await.unwrap();
    assert!(result.is_converged(), "{:?}", result);
}

#[tokio::test]
async fn remove_wins_over_later_add() {
    let (stores, trie) = memory_stores();
    let mut fixture = TestFixture::new(1);
    let url = "https://target.example";
    let remove = fixture.at(50).make_unlike(url);
    let add = fixture.at(100).make_like(url);

    assert!(stores.merge(&remove).await.unwrap().is_merged());
    assert_eq!(stores.merge(&add).await.unwrap(), MergeOutcome::Superseded);

    let reactions = stores.store(Family::Reaction);
    assert!(reactions.get_adds_by_fid(Fid(1)).await.unwrap().is_empty());
    assert_eq!(reactions.get_removes_by_fid(Fid(1)).await.unwrap(), vec![remove.clone()]);
    assert!(trie.read().exists(&remove.sync_id()));
    assert!(!trie.read().exists(&add.sync_id()));
}

#[tokio::test]
async fn later_remove_displaces_add() {
    let (stores, trie) = memory_stores();
    let mut fixture = TestFixture::new(1);
    let add = fixture.at(100).make_follow(9);
    let remove = fixture.at(90).make_unfollow(9);

    stores.merge(&add).await.unwrap();
    match stores.merge(&remove).await.unwrap() {
        MergeOutcome::Merged { deleted, .. } => assert_eq!(deleted, vec![add.clone()]),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(trie.read().items(), 1);
    assert_agrees(&stores, &trie).await;
}

#[test]
fn tie_break_prefers_greater_hash() {
    let aa = SyncId::new(100, &MessageHash::from_bytes([0xAA; 20]));
    let bb = SyncId::new(100, &MessageHash::from_bytes([0xBB; 20]));
    assert_eq!(
        compare(SetKind::Add, &aa, SetKind::Add, &bb),
        std::cmp::Ordering::Less
    );
}

#[tokio::test]
async fn equal_timestamp_adds_resolve_by_hash_in_either_order() {
    let fixture = TestFixture::new(1);
    let one = fixture.make_user_data(UserDataType::Bio, "first");
    let two = fixture.make_user_data(UserDataType::Bio, "second");
    let winner = if one.hash > two.hash { &one } else { &two };

    for order in [[&one, &two], [&two, &one]] {
        let (stores, _) = memory_stores();
        for m in order {
            stores.merge(m).await.unwrap();
        }
        let adds = stores
            .store(Family::UserData)
            .get_adds_by_fid(Fid(1))
            .await
            .unwrap();
        assert_eq!(adds, vec![winner.clone()]);
    }
}

#[tokio::test]
async fn prune_keeps_the_newest_rows() {
    let (stores, trie) = memory_stores();
    let stores = stores.with_prune_limit(Family::Cast, 3);
    let mut fixture = TestFixture::new(1);
    let mut casts = Vec::new();
    for i in 0..10u32 {
        let m = fixture.at(1_000 + i).make_cast_add(&format!("cast {}", i));
        stores.merge(&m).await.unwrap();
        casts.push(m);
    }

    let pruned = stores.prune_all(Fid(1)).await.unwrap();
    assert_eq!(pruned, 7);

    let mut kept = stores
        .store(Family::Cast)
        .get_adds_by_fid(Fid(1))
        .await
        .unwrap();
    kept.sort_by_key(|m| m.timestamp());
    assert_eq!(kept, casts[7..].to_vec());
    assert_eq!(trie.read().items(), 3);
    assert_agrees(&stores, &trie).await;
}
