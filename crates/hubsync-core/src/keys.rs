//! Storage key layout.
//!
//! Per-owner rows use `[family][fid u64 BE][marker][suffix]`, so a prefix
//! scan returns one owner's rows of one kind in order. Two global prefixes
//! sit above the family range:
//!
//! | prefix | key | value |
//! |---|---|---|
//! | `family,fid,0x01` | `SyncId` | CBOR message |
//! | `family,fid,0x02` | logical key | `SyncId` of the add |
//! | `family,fid,0x03` | logical key | `SyncId` of the remove |
//! | `family,fid,0x04` | signer ++ `SyncId` | empty |
//! | `0xE0` | `SyncId` | message row key |
//! | `0xE1` | event id u64 BE | CBOR hub event |

use crate::crypto::SignerKey;
use crate::error::{CoreError, Result};
use crate::family::{Family, SetKind};
use crate::types::{Fid, SyncId, SYNC_ID_LENGTH};

pub const MESSAGE_MARKER: u8 = 0x01;
pub const ADD_INDEX_MARKER: u8 = 0x02;
pub const REMOVE_INDEX_MARKER: u8 = 0x03;
pub const SIGNER_INDEX_MARKER: u8 = 0x04;

pub const SYNC_ID_INDEX_PREFIX: u8 = 0xE0;
pub const HUB_EVENT_PREFIX: u8 = 0xE1;

/// Length of `[family][fid][marker]`.
pub const OWNER_PREFIX_LENGTH: usize = 1 + 8 + 1;

fn owner_prefix(family: Family, fid: Fid, marker: u8) -> Vec<u8> {
    let mut key = Vec::with_capacity(OWNER_PREFIX_LENGTH + SYNC_ID_LENGTH + 32);
    key.push(family.to_u8());
    key.extend_from_slice(&fid.to_be_bytes());
    key.push(marker);
    key
}

/// Prefix of every message row for one owner and family.
pub fn message_prefix(family: Family, fid: Fid) -> Vec<u8> {
    owner_prefix(family, fid, MESSAGE_MARKER)
}

pub fn message_key(family: Family, fid: Fid, sync_id: &SyncId) -> Vec<u8> {
    let mut key = message_prefix(family, fid);
    key.extend_from_slice(sync_id.as_bytes());
    key
}

/// Prefix of the add or remove index for one owner and family.
pub fn set_index_prefix(family: Family, fid: Fid, kind: SetKind) -> Vec<u8> {
    let marker = match kind {
        SetKind::Add => ADD_INDEX_MARKER,
        SetKind::Remove => REMOVE_INDEX_MARKER,
    };
    owner_prefix(family, fid, marker)
}

pub fn set_index_key(family: Family, fid: Fid, kind: SetKind, logical_key: &[u8]) -> Vec<u8> {
    let mut key = set_index_prefix(family, fid, kind);
    key.extend_from_slice(logical_key);
    key
}

pub fn signer_prefix(family: Family, fid: Fid, signer: &SignerKey) -> Vec<u8> {
    let mut key = owner_prefix(family, fid, SIGNER_INDEX_MARKER);
    key.extend_from_slice(signer.as_bytes());
    key
}

pub fn signer_key(family: Family, fid: Fid, signer: &SignerKey, sync_id: &SyncId) -> Vec<u8> {
    let mut key = signer_prefix(family, fid, signer);
    key.extend_from_slice(sync_id.as_bytes());
    key
}

pub fn sync_id_index_key(sync_id: &SyncId) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + SYNC_ID_LENGTH);
    key.push(SYNC_ID_INDEX_PREFIX);
    key.extend_from_slice(sync_id.as_bytes());
    key
}

pub fn hub_event_key(event_id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(HUB_EVENT_PREFIX);
    key.extend_from_slice(&event_id.to_be_bytes());
    key
}

/// Recover the `SyncId` from the tail of a message row or signer index key.
pub fn sync_id_suffix(key: &[u8]) -> Result<SyncId> {
    if key.len() < OWNER_PREFIX_LENGTH + SYNC_ID_LENGTH {
        return Err(CoreError::MalformedKey(format!(
            "key of {} bytes has no sync id suffix",
            key.len()
        )));
    }
    SyncId::try_from(&key[key.len() - SYNC_ID_LENGTH..])
}

/// Recover the event id from a hub event key.
pub fn hub_event_id(key: &[u8]) -> Result<u64> {
    match key {
        [HUB_EVENT_PREFIX, rest @ ..] if rest.len() == 8 => {
            let mut id = [0u8; 8];
            id.copy_from_slice(rest);
            Ok(u64::from_be_bytes(id))
        }
        _ => Err(CoreError::MalformedKey("not a hub event key".into())),
    }
}

/// Smallest key strictly greater than every key starting with `prefix`.
///
/// `None` when the prefix is all `0xff` and the range is unbounded.
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}
