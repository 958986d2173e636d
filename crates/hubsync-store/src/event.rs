//! Hub events: the durable record of every state change in the stores.
//!
//! Event ids are `ms since network epoch (41 bits) << 12 | sequence`, so ids
//! sort by commit time and stay unique within one millisecond.

use serde::{Deserialize, Serialize};

use hubsync_core::time::NETWORK_EPOCH_MS;
use hubsync_core::Message;

use crate::error::{Result, StoreError};

pub const SEQUENCE_BITS: u32 = 12;
pub const TIMESTAMP_BITS: u32 = 41;

const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1;
const MAX_TIMESTAMP: u64 = (1 << TIMESTAMP_BITS) - 1;

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HubEventBody {
    /// A message was admitted, displacing zero or more outranked rows.
    MergeMessage {
        message: Message,
        deleted_messages: Vec<Message>,
    },
    /// A row was dropped by size-bounded pruning.
    PruneMessage { message: Message },
    /// A row was dropped because its signer was revoked.
    RevokeMessage { message: Message },
}

impl HubEventBody {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            HubEventBody::MergeMessage { .. } => "merge",
            HubEventBody::PruneMessage { .. } => "prune",
            HubEventBody::RevokeMessage { .. } => "revoke",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubEvent {
    pub id: u64,
    pub body: HubEventBody,
}

impl HubEvent {
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

/// Pack a timestamp offset and sequence into an event id.
pub fn make_event_id(timestamp: u64, sequence: u64) -> u64 {
    (timestamp << SEQUENCE_BITS) | sequence
}

/// Milliseconds since the network epoch encoded in an event id.
pub fn event_id_timestamp(id: u64) -> u64 {
    id >> SEQUENCE_BITS
}

/// Monotonic generator of hub event ids.
#[derive(Debug, Default)]
pub struct HubEventIdGenerator {
    last_timestamp: u64,
    sequence: u64,
}

impl HubEventIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume after `last_id` so ids stay increasing across restarts.
    pub fn resume_after(last_id: u64) -> Self {
        Self {
            last_timestamp: event_id_timestamp(last_id),
            sequence: last_id & MAX_SEQUENCE,
        }
    }

    /// Next id for a commit at Unix time `now_ms`.
    ///
    /// A clock that steps backwards keeps using the last timestamp.
    pub fn generate(&mut self, now_ms: i64) -> Result<u64> {
        let offset = u64::try_from(now_ms - NETWORK_EPOCH_MS).unwrap_or(0);
        if offset > MAX_TIMESTAMP {
            return Err(StoreError::InvalidArgument(format!(
                "event timestamp {} beyond id range",
                now_ms
            )));
        }
        if offset > self.last_timestamp {
            self.last_timestamp = offset;
            self.sequence = 0;
        } else {
            if self.sequence >= MAX_SEQUENCE {
                return Err(StoreError::EventIdOverflow);
            }
            self.sequence += 1;
        }
        Ok(make_event_id(self.last_timestamp, self.sequence))
    }
}
