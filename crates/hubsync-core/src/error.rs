//! Error types for hubsync core.

use thiserror::Error;

/// Errors raised while interpreting messages, ids and keys.
///
/// All of these are bad-request class errors: the input is malformed and
/// retrying it will not help.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown message type: {0}")]
    UnknownMessageType(u8),

    #[error("unknown family prefix: {0}")]
    UnknownFamily(u8),

    #[error("message type {message_type:?} does not belong to the {family:?} family")]
    FamilyMismatch {
        family: crate::family::Family,
        message_type: crate::message::MessageType,
    },

    #[error("malformed sync id: expected {expected} bytes, got {got}")]
    MalformedSyncId { expected: usize, got: usize },

    #[error("malformed key: {0}")]
    MalformedKey(String),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("timestamp out of range: {0}")]
    TimestampOutOfRange(i64),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
