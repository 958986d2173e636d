//! Proptest generators for property-based testing.

use bytes::Bytes;
use proptest::prelude::*;

use hubsync_core::{
    Fid, Message, MessageBody, MessageBuilder, MessageHash, MessageType, ReactionTarget,
    ReactionType, SyncId, UserDataType, VerificationAddBody,
};

/// Generate a random MessageHash.
pub fn message_hash() -> impl Strategy<Value = MessageHash> {
    any::<[u8; 20]>().prop_map(MessageHash::from_bytes)
}

/// Generate a network timestamp old enough to sit outside snapshot buckets.
pub fn timestamp() -> impl Strategy<Value = u32> {
    1_000u32..=1_000_000u32
}

/// Generate a random SyncId.
pub fn sync_id() -> impl Strategy<Value = SyncId> {
    (timestamp(), message_hash()).prop_map(|(ts, hash)| SyncId::new(ts, &hash))
}

/// Generate a small owner id, so owners collide.
pub fn fid() -> impl Strategy<Value = Fid> {
    (1u64..=4).prop_map(Fid)
}

/// One operation on a shared logical key.
#[derive(Debug, Clone)]
pub struct KeyOp {
    pub remove: bool,
    pub timestamp: u32,
    /// Varies the content, hence the hash, at equal timestamps.
    pub salt: u8,
}

impl Arbitrary for KeyOp {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        // Narrow timestamp range so ties happen.
        (any::<bool>(), 100u32..=105, any::<u8>())
            .prop_map(|(remove, timestamp, salt)| KeyOp {
                remove,
                timestamp,
                salt,
            })
            .boxed()
    }
}

/// A verification add or remove of one shared address by fid 1.
///
/// The salt lands in the add's block hash, so equal-timestamp adds still
/// hash differently. Removes carry no free field; equal ones are duplicates.
pub fn key_op_message(op: &KeyOp) -> Message {
    let address = Bytes::from_static(b"0xshared");
    let builder = if op.remove {
        MessageBuilder::verification_remove(Fid(1), address)
    } else {
        MessageBuilder::new(
            Fid(1),
            MessageType::VerificationAdd,
            MessageBody::VerificationAdd(VerificationAddBody {
                address,
                claim_signature: Bytes::new(),
                block_hash: Bytes::from(vec![op.salt]),
            }),
        )
    };
    builder.timestamp(op.timestamp).build().unwrap()
}

/// Parameters for an arbitrary message across families.
#[derive(Debug, Clone)]
pub struct MessageParams {
    pub fid: Fid,
    pub timestamp: u32,
    pub kind: u8,
    pub target: u8,
}

impl Arbitrary for MessageParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (fid(), timestamp(), 0u8..6, 0u8..4)
            .prop_map(|(fid, timestamp, kind, target)| MessageParams {
                fid,
                timestamp,
                kind,
                target,
            })
            .boxed()
    }
}

/// Build a message from parameters. Small `target` values make logical keys collide.
pub fn message_from_params(params: &MessageParams) -> Message {
    let url = format!("https://t.example/{}", params.target);
    let builder = match params.kind {
        0 => MessageBuilder::cast_add(params.fid, format!("cast {}", params.target)),
        1 => MessageBuilder::reaction(
            params.fid,
            MessageType::ReactionAdd,
            ReactionType::Like,
            ReactionTarget::Url(url),
        ),
        2 => MessageBuilder::reaction(
            params.fid,
            MessageType::ReactionRemove,
            ReactionType::Like,
            ReactionTarget::Url(url),
        ),
        3 => MessageBuilder::link(
            params.fid,
            MessageType::LinkAdd,
            "follow",
            Fid(params.target as u64 + 10),
        ),
        4 => MessageBuilder::link(
            params.fid,
            MessageType::LinkRemove,
            "follow",
            Fid(params.target as u64 + 10),
        ),
        _ => MessageBuilder::user_data(
            params.fid,
            UserDataType::Bio,
            format!("bio {}", params.target),
        ),
    };
    builder.timestamp(params.timestamp).build().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_message_hash_deterministic(params: MessageParams) {
            let a = message_from_params(&params);
            let b = message_from_params(&params);
            prop_assert_eq!(a.hash, b.hash);
            prop_assert_eq!(a.sync_id().timestamp(), params.timestamp);
        }

        #[test]
        fn test_key_op_messages_are_well_formed(op: KeyOp) {
            let m = key_op_message(&op);
            prop_assert!(m.check_shape().is_ok());
            prop_assert_eq!(m.timestamp(), op.timestamp);
        }
    }
}
