//! Hub-to-hub sync over the loopback client.

use std::sync::Arc;
use std::time::Duration;

use hubsync::core::{Fid, MessageBuilder, Network, SignerKey};
use hubsync::store::MemoryKv;
use hubsync::sync::{MemoryPeerClient, PeerClient, PeerId, SyncError, BLOCK_THRESHOLD};
use hubsync::{Hub, HubConfig, MemorySignerRegistry, Message};

async fn hub(config: HubConfig) -> Arc<Hub> {
    let signers = Arc::new(MemorySignerRegistry::new());
    for fid in 1..=2000 {
        signers.add_signer(Fid(fid), SignerKey::from_bytes([0; 32]));
    }
    Arc::new(
        Hub::new(config, Arc::new(MemoryKv::default()), signers)
            .await
            .unwrap(),
    )
}

fn cast(fid: u64, ts: u32, network: Network) -> Message {
    MessageBuilder::cast_add(Fid(fid), format!("cast {} @ {}", fid, ts))
        .timestamp(ts)
        .network(network)
        .build()
        .unwrap()
}

fn client(hub: &Arc<Hub>, id: u8) -> MemoryPeerClient {
    MemoryPeerClient::new(PeerId::from_bytes([id; 32]), hub.clone())
}

#[tokio::test]
async fn disjoint_hubs_converge_after_one_pass_each_way() {
    let a = hub(HubConfig::default()).await;
    let b = hub(HubConfig::default()).await;
    for i in 0..5 {
        a.submit_message(cast(1, 1_000 + i, Network::Devnet)).await.unwrap();
    }
    for i in 0..3 {
        b.submit_message(cast(2, 2_000 + i, Network::Devnet)).await.unwrap();
    }
    assert_ne!(a.root_digest(), b.root_digest());

    a.engine()
        .perform_sync(vec![Vec::new()], &client(&b, 2), a.as_ref())
        .await;
    b.engine()
        .perform_sync(vec![Vec::new()], &client(&a, 1), b.as_ref())
        .await;

    assert_eq!(a.num_messages(), 8);
    assert_eq!(b.num_messages(), 8);
    assert_eq!(a.root_digest(), b.root_digest());
}

#[tokio::test]
async fn smaller_hub_pulls_first_then_larger_catches_up() {
    let a = hub(HubConfig::default()).await;
    let b = hub(HubConfig::default()).await;
    for i in 0..5 {
        a.submit_message(cast(1, 1_000 + i, Network::Devnet)).await.unwrap();
    }
    for i in 0..3 {
        b.submit_message(cast(2, 2_000 + i, Network::Devnet)).await.unwrap();
    }

    // a has more, so it has nothing to pull from b yet.
    assert!(a.sync_with_peer(&client(&b, 2)).await.unwrap().is_none());

    let pulled = b.sync_with_peer(&client(&a, 1)).await.unwrap().unwrap();
    assert_eq!(pulled.success_count, 5);
    let pulled = a.sync_with_peer(&client(&b, 2)).await.unwrap().unwrap();
    assert_eq!(pulled.success_count, 3);
    assert_eq!(a.root_digest(), b.root_digest());

    // Converged hubs agree on every snapshot bucket.
    assert!(a.sync_with_peer(&client(&b, 2)).await.unwrap().is_none());
}

#[tokio::test]
async fn should_sync_is_false_while_a_pass_runs() {
    let a = hub(HubConfig::default()).await;
    let b = hub(HubConfig::default()).await;
    for i in 0..3 {
        b.submit_message(cast(2, 2_000 + i, Network::Devnet)).await.unwrap();
    }
    let slow = client(&b, 2).with_latency(Duration::from_millis(50));

    let (result, observed) = tokio::join!(a.sync_with_peer(&slow), async {
        tokio::time::sleep(Duration::from_millis(120)).await;
        let syncing = a.engine().is_syncing();
        let decision = a.engine().should_sync(&[], u64::MAX).unwrap();
        (syncing, decision)
    });

    assert_eq!(observed, (true, false));
    assert_eq!(result.unwrap().unwrap().success_count, 3);
    assert!(!a.engine().is_syncing());
}

#[tokio::test]
async fn peer_offering_only_unmergeable_messages_gets_blocked() {
    let local = hub(HubConfig::default()).await;
    let remote = hub(HubConfig {
        network: Network::Mainnet,
        ..HubConfig::default()
    })
    .await;
    for i in 0..1000u64 {
        remote
            .submit_message(cast(i + 1, 1_000 + i as u32 * 3, Network::Mainnet))
            .await
            .unwrap();
    }
    let peer = client(&remote, 9);

    for _ in 0..3 {
        let result = local.sync_with_peer(&peer).await.unwrap().unwrap();
        assert_eq!(result.total, 1000);
        assert_eq!(result.success_count, 0);
        assert_eq!(result.deferred_count, 0);
    }

    let score = local.engine().scorer().score(&peer.peer_id()).unwrap();
    assert!(score.score <= BLOCK_THRESHOLD);
    assert_eq!(local.bad_peers(), vec![peer.peer_id()]);
    assert!(matches!(
        local.sync_with_peer(&peer).await,
        Err(hubsync::HubError::Sync(SyncError::PeerBlocked(_)))
    ));
    assert_eq!(local.num_messages(), 0);
}

#[tokio::test]
async fn stop_interrupts_a_running_pass() {
    let a = hub(HubConfig::default()).await;
    let b = hub(HubConfig::default()).await;
    for i in 0..10 {
        b.submit_message(cast(2, 2_000 + i, Network::Devnet)).await.unwrap();
    }
    let slow = client(&b, 2).with_latency(Duration::from_millis(30));

    let (result, stopped) = tokio::join!(a.sync_with_peer(&slow), async {
        tokio::time::sleep(Duration::from_millis(70)).await;
        a.stop().await
    });

    assert!(stopped);
    let merged = result.unwrap().map(|r| r.success_count).unwrap_or(0);
    assert!(merged < 10);
    assert!(!a.engine().is_syncing());
}
