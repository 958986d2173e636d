//! Signer registry: which keys may sign for which fid.
//!
//! Owned upstream of the hub. The hub only asks whether a signer is active
//! and forwards removals to its stores.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use hubsync_core::{Fid, SignerKey};

pub trait SignerRegistry: Send + Sync {
    fn is_active(&self, fid: Fid, signer: &SignerKey) -> bool;

    /// Deregister a signer. Returns false if it was not registered.
    fn remove_signer(&self, fid: Fid, signer: &SignerKey) -> bool;
}

/// In-memory registry for tests and single-process setups.
#[derive(Debug, Default)]
pub struct MemorySignerRegistry {
    signers: RwLock<HashMap<Fid, BTreeSet<SignerKey>>>,
}

impl MemorySignerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_signer(&self, fid: Fid, signer: SignerKey) {
        let mut signers = self.signers.write().unwrap_or_else(|e| e.into_inner());
        signers.entry(fid).or_default().insert(signer);
    }

    pub fn signers(&self, fid: Fid) -> Vec<SignerKey> {
        let signers = self.signers.read().unwrap_or_else(|e| e.into_inner());
        signers
            .get(&fid)
            .map(|keys| keys.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl SignerRegistry for MemorySignerRegistry {
    fn is_active(&self, fid: Fid, signer: &SignerKey) -> bool {
        let signers = self.signers.read().unwrap_or_else(|e| e.into_inner());
        signers.get(&fid).is_some_and(|keys| keys.contains(signer))
    }

    fn remove_signer(&self, fid: Fid, signer: &SignerKey) -> bool {
        let mut signers = self.signers.write().unwrap_or_else(|e| e.into_inner());
        signers
            .get_mut(&fid)
            .map(|keys| keys.remove(signer))
            .unwrap_or(false)
    }
}
