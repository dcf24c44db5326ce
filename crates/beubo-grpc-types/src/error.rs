//! Shared error types for the relay.

use thiserror::Error;

/// Errors raised while converting plugin messages to and from typed values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The message could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The payload declared a recognized type but its bytes did not decode.
    #[error("Deserialization error for {type_url}: {reason}")]
    Deserialization {
        /// The declared type identifier.
        type_url: String,
        /// Why decoding failed.
        reason: String,
    },
}

/// Alias for codec results.
pub type CodecResult<T> = Result<T, CodecError>;
