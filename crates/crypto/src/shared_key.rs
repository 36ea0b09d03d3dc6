//! Key derivation for message body encryption.
//!
//! Every conversation and every user shares one pre-shared secret, supplied
//! through configuration. The secret is stretched into a 32-byte AES-256 key
//! with HKDF-SHA256 so secrets of any length map onto a valid key.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

const MESSAGE_KEY_INFO: &[u8] = b"healio-message-body-v1";
pub(crate) const KEY_SIZE: usize = 32;

/// A 32-byte message key, securely wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedKey {
    key: [u8; KEY_SIZE],
}

impl std::fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl SharedKey {
    /// Derive the message key from the configured pre-shared secret.
    pub fn from_secret(secret: &str) -> Result<Self, CryptoError> {
        if secret.is_empty() {
            return Err(CryptoError::InvalidKey("shared secret is empty".into()));
        }

        let hk = Hkdf::<Sha256>::new(None, secret.as_bytes());
        let mut key = [0u8; KEY_SIZE];
        hk.expand(MESSAGE_KEY_INFO, &mut key)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

        Ok(Self { key })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}
