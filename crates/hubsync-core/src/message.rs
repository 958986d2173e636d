//! Message: the signed, user-authored event a Hub stores and syncs.
//!
//! Messages arrive here already validated. This module only models them,
//! hashes them and encodes them for storage and the wire.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::crypto::{MessageHash, SignerKey};
use crate::error::{CoreError, Result};
use crate::types::{Fid, SyncId};

/// Message type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    CastAdd = 1,
    CastRemove = 2,
    ReactionAdd = 3,
    ReactionRemove = 4,
    LinkAdd = 5,
    LinkRemove = 6,
    VerificationAdd = 7,
    VerificationRemove = 8,
    UserDataAdd = 11,
    UsernameProof = 12,
}

impl MessageType {
    /// Convert to u8 for serialization.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse from u8.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::CastAdd),
            2 => Ok(Self::CastRemove),
            3 => Ok(Self::ReactionAdd),
            4 => Ok(Self::ReactionRemove),
            5 => Ok(Self::LinkAdd),
            6 => Ok(Self::LinkRemove),
            7 => Ok(Self::VerificationAdd),
            8 => Ok(Self::VerificationRemove),
            11 => Ok(Self::UserDataAdd),
            12 => Ok(Self::UsernameProof),
            other => Err(CoreError::UnknownMessageType(other)),
        }
    }
}

/// Which network a message was produced for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Network {
    Mainnet,
    Testnet,
    Devnet,
}

/// Identifies a cast by its author and hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CastId {
    pub fid: Fid,
    pub hash: MessageHash,
}

impl CastId {
    /// Bytes used when a cast id forms part of a storage key.
    pub fn key_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(28);
        out.extend_from_slice(&self.fid.to_be_bytes());
        out.extend_from_slice(self.hash.as_bytes());
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ReactionType {
    Like = 1,
    Recast = 2,
}

/// What a reaction points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReactionTarget {
    Cast(CastId),
    Url(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum UserDataType {
    Pfp = 1,
    Display = 2,
    Bio = 3,
    Url = 5,
    Username = 6,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastAddBody {
    pub text: String,
    pub mentions: Vec<Fid>,
    pub parent: Option<CastId>,
    pub embeds: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastRemoveBody {
    pub target_hash: MessageHash,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionBody {
    pub reaction_type: ReactionType,
    pub target: ReactionTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkBody {
    /// Free-form relationship name, at most 8 bytes (e.g. "follow").
    pub link_type: String,
    pub target_fid: Fid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationAddBody {
    pub address: Bytes,
    pub claim_signature: Bytes,
    pub block_hash: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRemoveBody {
    pub address: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDataBody {
    pub field: UserDataType,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsernameProofBody {
    pub name: Bytes,
    pub owner: Bytes,
    /// Unix seconds at which the name registry issued the proof.
    pub issued_at: u64,
}

/// Type-specific payload of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageBody {
    CastAdd(CastAddBody),
    CastRemove(CastRemoveBody),
    Reaction(ReactionBody),
    Link(LinkBody),
    VerificationAdd(VerificationAddBody),
    VerificationRemove(VerificationRemoveBody),
    UserData(UserDataBody),
    UsernameProof(UsernameProofBody),
}

impl MessageBody {
    /// Check that this body can carry the given message type.
    pub fn matches(&self, message_type: MessageType) -> bool {
        matches!(
            (self, message_type),
            (MessageBody::CastAdd(_), MessageType::CastAdd)
                | (MessageBody::CastRemove(_), MessageType::CastRemove)
                | (MessageBody::Reaction(_), MessageType::ReactionAdd)
                | (MessageBody::Reaction(_), MessageType::ReactionRemove)
                | (MessageBody::Link(_), MessageType::LinkAdd)
                | (MessageBody::Link(_), MessageType::LinkRemove)
                | (MessageBody::VerificationAdd(_), MessageType::VerificationAdd)
                | (MessageBody::VerificationRemove(_), MessageType::VerificationRemove)
                | (MessageBody::UserData(_), MessageType::UserDataAdd)
                | (MessageBody::UsernameProof(_), MessageType::UsernameProof)
        )
    }
}

/// The signed portion of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageData {
    pub message_type: MessageType,
    pub fid: Fid,
    /// Seconds since the network epoch.
    pub timestamp: u32,
    pub network: Network,
    pub body: MessageBody,
}

impl MessageData {
    /// CBOR encoding of the data; the input to the message hash.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| CoreError::EncodingError(e.to_string()))?;
        Ok(buf)
    }

    /// Content hash of this data.
    pub fn compute_hash(&self) -> Result<MessageHash> {
        Ok(MessageHash::hash(&self.encode()?))
    }
}

/// A complete message: data plus hash, signer and signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub data: MessageData,
    pub hash: MessageHash,
    pub signer: SignerKey,
    pub signature: Bytes,
}

impl Message {
    /// The owning identity.
    pub fn fid(&self) -> Fid {
        self.data.fid
    }

    /// The message type.
    pub fn message_type(&self) -> MessageType {
        self.data.message_type
    }

    /// Network timestamp in seconds.
    pub fn timestamp(&self) -> u32 {
        self.data.timestamp
    }

    /// The trie key for this message.
    pub fn sync_id(&self) -> SyncId {
        SyncId::new(self.data.timestamp, &self.hash)
    }

    /// Check that the type tag and body agree.
    pub fn check_shape(&self) -> Result<()> {
        if self.data.body.matches(self.data.message_type) {
            Ok(())
        } else {
            Err(CoreError::MalformedMessage(format!(
                "body does not match message type {:?}",
                self.data.message_type
            )))
        }
    }

    /// CBOR encoding of the whole message.
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| CoreError::EncodingError(e.to_string()))?;
        Ok(buf)
    }

    /// Decode a message from CBOR.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
    }
}

/// Builder for creating messages.
pub struct MessageBuilder {
    fid: Fid,
    message_type: MessageType,
    body: MessageBody,
    timestamp: u32,
    network: Network,
    signer: SignerKey,
    signature: Bytes,
}

impl MessageBuilder {
    /// Start building a message.
    pub fn new(fid: Fid, message_type: MessageType, body: MessageBody) -> Self {
        Self {
            fid,
            message_type,
            body,
            timestamp: 0,
            network: Network::Devnet,
            signer: SignerKey::from_bytes([0u8; 32]),
            signature: Bytes::new(),
        }
    }

    pub fn cast_add(fid: Fid, text: impl Into<String>) -> Self {
        Self::new(
            fid,
            MessageType::CastAdd,
            MessageBody::CastAdd(CastAddBody {
                text: text.into(),
                mentions: Vec::new(),
                parent: None,
                embeds: Vec::new(),
            }),
        )
    }

    pub fn cast_remove(fid: Fid, target_hash: MessageHash) -> Self {
        Self::new(
            fid,
            MessageType::CastRemove,
            MessageBody::CastRemove(CastRemoveBody { target_hash }),
        )
    }

    pub fn reaction(
        fid: Fid,
        message_type: MessageType,
        reaction_type: ReactionType,
        target: ReactionTarget,
    ) -> Self {
        Self::new(
            fid,
            message_type,
            MessageBody::Reaction(ReactionBody {
                reaction_type,
                target,
            }),
        )
    }

    pub fn link(fid: Fid, message_type: MessageType, link_type: &str, target_fid: Fid) -> Self {
        Self::new(
            fid,
            message_type,
            MessageBody::Link(LinkBody {
                link_type: link_type.to_string(),
                target_fid,
            }),
        )
    }

    pub fn verification_add(fid: Fid, address: impl Into<Bytes>) -> Self {
        Self::new(
            fid,
            MessageType::VerificationAdd,
            MessageBody::VerificationAdd(VerificationAddBody {
                address: address.into(),
                claim_signature: Bytes::new(),
                block_hash: Bytes::new(),
            }),
        )
    }

    pub fn verification_remove(fid: Fid, address: impl Into<Bytes>) -> Self {
        Self::new(
            fid,
            MessageType::VerificationRemove,
            MessageBody::VerificationRemove(VerificationRemoveBody {
                address: address.into(),
            }),
        )
    }

    pub fn user_data(fid: Fid, field: UserDataType, value: impl Into<String>) -> Self {
        Self::new(
            fid,
            MessageType::UserDataAdd,
            MessageBody::UserData(UserDataBody {
                field,
                value: value.into(),
            }),
        )
    }

    pub fn username_proof(fid: Fid, name: impl Into<Bytes>, owner: impl Into<Bytes>) -> Self {
        Self::new(
            fid,
            MessageType::UsernameProof,
            MessageBody::UsernameProof(UsernameProofBody {
                name: name.into(),
                owner: owner.into(),
                issued_at: 0,
            }),
        )
    }

    /// Set the network timestamp.
    pub fn timestamp(mut self, ts: u32) -> Self {
        self.timestamp = ts;
        self
    }

    /// Set the network.
    pub fn network(mut self, network: Network) -> Self {
        self.network = network;
        self
    }

    /// Set the signer key.
    pub fn signer(mut self, signer: SignerKey) -> Self {
        self.signer = signer;
        self
    }

    /// Attach opaque signature bytes.
    pub fn signature(mut self, signature: impl Into<Bytes>) -> Self {
        self.signature = signature.into();
        self
    }

    /// Hash the data and assemble the message.
    pub fn build(self) -> Result<Message> {
        let data = MessageData {
            message_type: self.message_type,
            fid: self.fid,
            timestamp: self.timestamp,
            network: self.network,
            body: self.body,
        };
        if !data.body.matches(data.message_type) {
            return Err(CoreError::MalformedMessage(format!(
                "body does not match message type {:?}",
                data.message_type
            )));
        }
        let hash = data.compute_hash()?;
        Ok(Message {
            data,
            hash,
            signer: self.signer,
            signature: self.signature,
        })
    }
}
