//! # hubsync core
//!
//! Pure primitives shared by the store and sync engines: messages, message
//! families, sync ids, hashing and the storage key layout.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`Message`] - A validated, signed user event
//! - [`SyncId`] - `timestamp ++ hash`, the trie key of a message
//! - [`Family`] - Which add/remove set a message belongs to
//! - [`MessageHash`] - Blake3 truncated to 160 bits
//!
//! ## Conflict order
//!
//! All families share one ordering, see [`family::compare`].

pub mod crypto;
pub mod error;
pub mod family;
pub mod keys;
pub mod message;
pub mod time;
pub mod types;

pub use crypto::{hash160, Hasher160, MessageHash, SignerKey, HASH_LENGTH};
pub use error::{CoreError, Result};
pub use family::{compare, Family, FamilyDescriptor, SetKind};
pub use message::{
    CastAddBody, CastId, CastRemoveBody, LinkBody, Message, MessageBody, MessageBuilder,
    MessageData, MessageType, Network, ReactionBody, ReactionTarget, ReactionType, UserDataBody,
    UserDataType, UsernameProofBody, VerificationAddBody, VerificationRemoveBody,
};
pub use types::{Fid, SyncId, SYNC_ID_LENGTH, TIMESTAMP_LENGTH};
