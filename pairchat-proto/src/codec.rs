//! Serialization and deserialization of [`ChatSample`]s.
//!
//! Transports that move bytes rather than values encode samples with
//! postcard before delivery and decode them per reader.

use crate::sample::{ChatSample, MAX_MESSAGE_SIZE};

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// The sample text exceeds [`MAX_MESSAGE_SIZE`].
    #[error("message too large ({size} bytes, max {max} bytes)")]
    TooLarge {
        /// Actual size of the text in bytes.
        size: usize,
        /// Maximum allowed size in bytes.
        max: usize,
    },
}

/// Encodes a [`ChatSample`] into a byte vector using postcard.
///
/// # Errors
///
/// Returns `CodecError::TooLarge` if the text exceeds [`MAX_MESSAGE_SIZE`],
/// or `CodecError::Serialization` if the sample cannot be serialized.
pub fn encode(sample: &ChatSample) -> Result<Vec<u8>, CodecError> {
    let size = sample.message.len();
    if size > MAX_MESSAGE_SIZE {
        return Err(CodecError::TooLarge {
            size,
            max: MAX_MESSAGE_SIZE,
        });
    }
    postcard::to_allocvec(sample).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`ChatSample`] from a byte slice using postcard.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the bytes cannot be deserialized.
pub fn decode(bytes: &[u8]) -> Result<ChatSample, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}
