//! Message families and the conflict order shared by all of them.
//!
//! Every family runs the same add-set/remove-set merge. What differs is the
//! shape of the logical key two messages compete over, which message types
//! land in which set, and how many add rows an owner may keep. That
//! difference is captured by a [`FamilyDescriptor`].

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::{CoreError, Result};
use crate::message::{Message, MessageBody, MessageType, ReactionTarget};
use crate::types::SyncId;

/// Width link types are padded to inside a logical key.
pub const LINK_TYPE_WIDTH: usize = 8;

/// Closed set of message families. The discriminant is the storage prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Family {
    Cast = 1,
    Reaction = 2,
    Link = 3,
    Verification = 4,
    UserData = 5,
    UsernameProof = 6,
}

/// Which side of the CRDT a message sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SetKind {
    Add,
    Remove,
}

/// Static per-family parameters for the generic merge algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyDescriptor {
    pub family: Family,
    pub name: &'static str,
    pub add_type: MessageType,
    /// `None` for add-only families.
    pub remove_type: Option<MessageType>,
    /// Default maximum number of add rows per owner.
    pub prune_limit: usize,
}

const DESCRIPTORS: [FamilyDescriptor; 6] = [
    FamilyDescriptor {
        family: Family::Cast,
        name: "cast",
        add_type: MessageType::CastAdd,
        remove_type: Some(MessageType::CastRemove),
        prune_limit: 5000,
    },
    FamilyDescriptor {
        family: Family::Reaction,
        name: "reaction",
        add_type: MessageType::ReactionAdd,
        remove_type: Some(MessageType::ReactionRemove),
        prune_limit: 2500,
    },
    FamilyDescriptor {
        family: Family::Link,
        name: "link",
        add_type: MessageType::LinkAdd,
        remove_type: Some(MessageType::LinkRemove),
        prune_limit: 2500,
    },
    FamilyDescriptor {
        family: Family::Verification,
        name: "verification",
        add_type: MessageType::VerificationAdd,
        remove_type: Some(MessageType::VerificationRemove),
        prune_limit: 50,
    },
    FamilyDescriptor {
        family: Family::UserData,
        name: "user_data",
        add_type: MessageType::UserDataAdd,
        remove_type: None,
        prune_limit: 100,
    },
    FamilyDescriptor {
        family: Family::UsernameProof,
        name: "username_proof",
        add_type: MessageType::UsernameProof,
        remove_type: None,
        prune_limit: 10,
    },
];

impl Family {
    /// All families, in prefix order.
    pub const ALL: [Family; 6] = [
        Family::Cast,
        Family::Reaction,
        Family::Link,
        Family::Verification,
        Family::UserData,
        Family::UsernameProof,
    ];

    /// Storage prefix byte.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse a storage prefix byte.
    pub fn from_u8(value: u8) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.to_u8() == value)
            .ok_or(CoreError::UnknownFamily(value))
    }

    /// The family a message type belongs to.
    pub fn of(message_type: MessageType) -> Self {
        match message_type {
            MessageType::CastAdd | MessageType::CastRemove => Family::Cast,
            MessageType::ReactionAdd | MessageType::ReactionRemove => Family::Reaction,
            MessageType::LinkAdd | MessageType::LinkRemove => Family::Link,
            MessageType::VerificationAdd | MessageType::VerificationRemove => {
                Family::Verification
            }
            MessageType::UserDataAdd => Family::UserData,
            MessageType::UsernameProof => Family::UsernameProof,
        }
    }

    pub fn descriptor(self) -> &'static FamilyDescriptor {
        &DESCRIPTORS[self as usize - 1]
    }

    /// Classify a message type within this family.
    pub fn kind_of(self, message_type: MessageType) -> Result<SetKind> {
        let desc = self.descriptor();
        if message_type == desc.add_type {
            Ok(SetKind::Add)
        } else if desc.remove_type == Some(message_type) {
            Ok(SetKind::Remove)
        } else {
            Err(CoreError::FamilyMismatch {
                family: self,
                message_type,
            })
        }
    }

    /// Bytes identifying what a message competes over within its owner.
    ///
    /// An add and the remove that cancels it produce the same key.
    pub fn logical_key(self, message: &Message) -> Result<Vec<u8>> {
        self.kind_of(message.message_type())?;
        let key = match (self, &message.data.body) {
            (Family::Cast, MessageBody::CastAdd(_)) => message.hash.as_bytes().to_vec(),
            (Family::Cast, MessageBody::CastRemove(body)) => body.target_hash.as_bytes().to_vec(),
            (Family::Reaction, MessageBody::Reaction(body)) => {
                let mut key = vec![body.reaction_type as u8];
                match &body.target {
                    ReactionTarget::Cast(cast_id) => key.extend_from_slice(&cast_id.key_bytes()),
                    ReactionTarget::Url(url) => key.extend_from_slice(url.as_bytes()),
                }
                key
            }
            (Family::Link, MessageBody::Link(body)) => {
                let raw = body.link_type.as_bytes();
                if raw.len() > LINK_TYPE_WIDTH {
                    return Err(CoreError::MalformedMessage(format!(
                        "link type longer than {} bytes",
                        LINK_TYPE_WIDTH
                    )));
                }
                let mut key = vec![0u8; LINK_TYPE_WIDTH];
                key[..raw.len()].copy_from_slice(raw);
                key.extend_from_slice(&body.target_fid.to_be_bytes());
                key
            }
            (Family::Verification, MessageBody::VerificationAdd(body)) => body.address.to_vec(),
            (Family::Verification, MessageBody::VerificationRemove(body)) => {
                body.address.to_vec()
            }
            (Family::UserData, MessageBody::UserData(body)) => {
                (body.field as u16).to_be_bytes().to_vec()
            }
            (Family::UsernameProof, MessageBody::UsernameProof(body)) => body.name.to_vec(),
            _ => {
                return Err(CoreError::MalformedMessage(format!(
                    "body does not match message type {:?}",
                    message.message_type()
                )))
            }
        };
        if key.is_empty() {
            return Err(CoreError::MalformedMessage("empty logical key".into()));
        }
        Ok(key)
    }
}

/// Rank two messages competing for one logical key.
///
/// A remove beats an add whatever the timestamps. Within a kind the larger
/// SyncId wins, which orders by timestamp and then by hash. `Equal` means
/// the two are the same message.
pub fn compare(a_kind: SetKind, a_id: &SyncId, b_kind: SetKind, b_id: &SyncId) -> Ordering {
    match (a_kind, b_kind) {
        (SetKind::Remove, SetKind::Add) => Ordering::Greater,
        (SetKind::Add, SetKind::Remove) => Ordering::Less,
        _ => a_id.cmp(b_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::MessageHash;
    use crate::message::{CastId, MessageBuilder, ReactionType, UserDataType};
    use crate::types::Fid;

    fn id(ts: u32, fill: u8) -> SyncId {
        SyncId::new(ts, &MessageHash::from_bytes([fill; 20]))
    }

    #[test]
    fn test_prefix_roundtrip() {
        for family in Family::ALL {
            assert_eq!(Family::from_u8(family.to_u8()).unwrap(), family);
            assert_eq!(family.descriptor().family, family);
        }
        assert!(Family::from_u8(0).is_err());
        assert!(Family::from_u8(7).is_err());
    }

    #[test]
    fn test_remove_beats_later_add() {
        assert_eq!(
            compare(SetKind::Remove, &id(1, 0), SetKind::Add, &id(100, 0xff)),
            Ordering::Greater
        );
        assert_eq!(
            compare(SetKind::Add, &id(100, 0xff), SetKind::Remove, &id(1, 0)),
            Ordering::Less
        );
    }

    #[test]
    fn test_same_kind_timestamp_then_hash() {
        assert_eq!(
            compare(SetKind::Add, &id(2, 0x00), SetKind::Add, &id(1, 0xff)),
            Ordering::Greater
        );
        assert_eq!(
            compare(SetKind::Add, &id(5, 0xAA), SetKind::Add, &id(5, 0xBB)),
            Ordering::Less
        );
        assert_eq!(
            compare(SetKind::Remove, &id(5, 0xAA), SetKind::Remove, &id(5, 0xAA)),
            Ordering::Equal
        );
    }

    #[test]
    fn test_kind_of_rejects_foreign_type() {
        assert_eq!(Family::Cast.kind_of(MessageType::CastRemove).unwrap(), SetKind::Remove);
        assert!(matches!(
            Family::Cast.kind_of(MessageType::LinkAdd),
            Err(CoreError::FamilyMismatch { .. })
        ));
        assert!(Family::UserData.descriptor().remove_type.is_none());
    }

    #[test]
    fn test_cast_add_and_remove_share_key() {
        let add = MessageBuilder::cast_add(Fid(1), "hi").timestamp(1).build().unwrap();
        let remove = MessageBuilder::cast_remove(Fid(1), add.hash)
            .timestamp(2)
            .build()
            .unwrap();
        assert_eq!(
            Family::Cast.logical_key(&add).unwrap(),
            Family::Cast.logical_key(&remove).unwrap()
        );
    }

    #[test]
    fn test_reaction_key_distinguishes_type() {
        let target = ReactionTarget::Cast(CastId {
            fid: Fid(2),
            hash: MessageHash::from_bytes([9; 20]),
        });
        let like = MessageBuilder::reaction(
            Fid(1),
            MessageType::ReactionAdd,
            ReactionType::Like,
            target.clone(),
        )
        .build()
        .unwrap();
        let recast = MessageBuilder::reaction(
            Fid(1),
            MessageType::ReactionAdd,
            ReactionType::Recast,
            target,
        )
        .build()
        .unwrap();
        assert_ne!(
            Family::Reaction.logical_key(&like).unwrap(),
            Family::Reaction.logical_key(&recast).unwrap()
        );
    }

    #[test]
    fn test_link_key_padding() {
        let msg = MessageBuilder::link(Fid(1), MessageType::LinkAdd, "follow", Fid(0x0102))
            .build()
            .unwrap();
        let key = Family::Link.logical_key(&msg).unwrap();
        assert_eq!(&key[..8], b"follow\0\0");
        assert_eq!(&key[8..], &0x0102u64.to_be_bytes());

        let long = MessageBuilder::link(Fid(1), MessageType::LinkAdd, "superfollow", Fid(2))
            .build()
            .unwrap();
        assert!(Family::Link.logical_key(&long).is_err());
    }

    fn kind(remove: bool) -> SetKind {
        if remove {
            SetKind::Remove
        } else {
            SetKind::Add
        }
    }

    proptest::proptest! {
        #[test]
        fn prop_compare_is_antisymmetric(
            a_remove: bool, a_ts: u32, a_fill: u8,
            b_remove: bool, b_ts: u32, b_fill: u8,
        ) {
            let a = id(a_ts, a_fill);
            let b = id(b_ts, b_fill);
            let ab = compare(kind(a_remove), &a, kind(b_remove), &b);
            let ba = compare(kind(b_remove), &b, kind(a_remove), &a);
            proptest::prop_assert_eq!(ab, ba.reverse());
        }
    }

    #[test]
    fn test_user_data_key_is_field() {
        let msg = MessageBuilder::user_data(Fid(1), UserDataType::Bio, "x")
            .build()
            .unwrap();
        assert_eq!(Family::UserData.logical_key(&msg).unwrap(), vec![0, 3]);
    }
}
