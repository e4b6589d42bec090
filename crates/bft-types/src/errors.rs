//! # Error Types
//!
//! Errors shared across crates.

use thiserror::Error;

/// Errors from signing and signer recovery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Signature bytes are not a valid `r || s` pair.
    #[error("Invalid signature format")]
    InvalidFormat,

    /// Trailing byte is not a valid recovery id.
    #[error("Invalid recovery id")]
    InvalidRecoveryId,

    /// Public key could not be recovered.
    #[error("Public key recovery failed")]
    RecoveryFailed,

    #[error("Signing failed: {0}")]
    SigningFailed(String),
}

/// Errors from canonical message encoding.
#[derive(Debug, Clone, Error)]
pub enum EncodingError {
    #[error("Encoding failed: {0}")]
    Encode(String),

    #[error("Decoding failed: {0}")]
    Decode(String),
}

impl From<bincode::Error> for EncodingError {
    fn from(e: bincode::Error) -> Self {
        EncodingError::Encode(e.to_string())
    }
}
