//! Error types for the healio-crypto crate.

use thiserror::Error;

/// Errors that can occur while encrypting or decrypting message bodies.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The provided key material is invalid (empty secret, wrong length).
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The cipher rejected the plaintext.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed (wrong key, tampered or truncated ciphertext).
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Ciphertext was not valid base64 or plaintext was not valid UTF-8.
    #[error("encoding error: {0}")]
    Encoding(String),
}

impl From<base64::DecodeError> for CryptoError {
    fn from(err: base64::DecodeError) -> Self {
        CryptoError::Encoding(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for CryptoError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        CryptoError::Encoding(err.to_string())
    }
}

impl From<CryptoError> for healio_shared::error::HealioError {
    fn from(err: CryptoError) -> Self {
        healio_shared::error::HealioError::Crypto(err.to_string())
    }
}
