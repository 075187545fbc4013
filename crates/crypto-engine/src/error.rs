//! Crypto engine error types

use thiserror::Error;

/// Cryptographic operation error
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("no derived key: key exchange has not completed")]
    NotReady,

    #[error("peer public key is not a valid point on the curve")]
    InvalidPeerKey,

    #[error("decryption failed: authentication tag mismatch")]
    AuthenticationFailed,

    #[error("encryption failed: {0}")]
    Encryption(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
