//! Peer reputation fed by sync outcomes.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use hubsync_core::time::now_millis;

use crate::engine::MergeResult;
use crate::messages::PeerId;

/// Score at or below which a peer is blocked.
pub const BLOCK_THRESHOLD: i64 = -30;

/// A sync that offered at least this many candidates and admitted nothing is bad.
pub const BAD_SYNC_MIN_TOTAL: u64 = 1000;

const FREQUENT_SYNC_PENALTY: i64 = -2;
const BAD_SYNC_PENALTY: i64 = -10;
const GOOD_SYNC_REWARD: i64 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerScore {
    pub score: i64,
    pub blocked: bool,
    /// Time of first block, ms since the Unix epoch.
    pub blocked_at: Option<u64>,
    pub last_sync_time: Option<u64>,
    pub last_bad_sync_time: Option<u64>,
    pub last_sync_result: Option<MergeResult>,
}

/// Instance-owned peer scores.
#[derive(Debug)]
pub struct PeerScorer {
    min_sync_interval: Duration,
    scores: Mutex<HashMap<PeerId, PeerScore>>,
}

impl PeerScorer {
    pub fn new(min_sync_interval: Duration) -> Self {
        Self {
            min_sync_interval,
            scores: Mutex::new(HashMap::new()),
        }
    }

    /// Record the outcome of a finished sync pass.
    pub fn update_last_sync(&self, peer: PeerId, result: MergeResult) {
        self.update_last_sync_at(peer, result, now_millis().max(0) as u64);
    }

    /// As [`update_last_sync`](Self::update_last_sync) with an explicit clock.
    pub fn update_last_sync_at(&self, peer: PeerId, result: MergeResult, now_ms: u64) {
        let mut scores = self.scores.lock().unwrap_or_else(|e| e.into_inner());
        let entry = scores.entry(peer).or_default();

        if let Some(last) = entry.last_sync_time {
            if now_ms.saturating_sub(last) < self.min_sync_interval.as_millis() as u64 {
                entry.score += FREQUENT_SYNC_PENALTY;
            }
        }

        if result.total >= BAD_SYNC_MIN_TOTAL
            && result.success_count == 0
            && result.deferred_count == 0
        {
            entry.score += BAD_SYNC_PENALTY;
            entry.last_bad_sync_time = Some(now_ms);
            tracing::warn!(peer = %peer, total = result.total, "peer offered nothing mergeable");
        }

        // success >= 80% of total
        if result.total == 0 || result.success_count * 5 >= result.total * 4 {
            entry.score += GOOD_SYNC_REWARD;
        }

        entry.last_sync_time = Some(now_ms);
        entry.last_sync_result = Some(result);
        tracing::debug!(peer = %peer, score = entry.score, "peer score updated");
    }

    /// Peers at or below the block threshold. Marks them blocked.
    pub fn get_bad_peer_ids(&self) -> Vec<PeerId> {
        self.get_bad_peer_ids_at(now_millis().max(0) as u64)
    }

    pub fn get_bad_peer_ids_at(&self, now_ms: u64) -> Vec<PeerId> {
        let mut scores = self.scores.lock().unwrap_or_else(|e| e.into_inner());
        let mut bad: Vec<PeerId> = scores
            .iter_mut()
            .filter(|(_, s)| s.score <= BLOCK_THRESHOLD)
            .map(|(peer, s)| {
                if !s.blocked {
                    s.blocked = true;
                    s.blocked_at = Some(now_ms);
                    tracing::warn!(peer = %peer, score = s.score, "blocking peer");
                }
                *peer
            })
            .collect();
        bad.sort();
        bad
    }

    pub fn is_blocked(&self, peer: &PeerId) -> bool {
        let scores = self.scores.lock().unwrap_or_else(|e| e.into_inner());
        scores.get(peer).map(|s| s.blocked).unwrap_or(false)
    }

    pub fn score(&self, peer: &PeerId) -> Option<PeerScore> {
        let scores = self.scores.lock().unwrap_or_else(|e| e.into_inner());
        scores.get(peer).cloned()
    }
}
