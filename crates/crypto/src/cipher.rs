//! Message body encryption using AES-256-GCM.
//!
//! Ciphertext is stored as a text field, so the wire form is
//! `base64(nonce (12 bytes) || ciphertext || auth tag (16 bytes))` using the
//! standard alphabet. Each call draws a fresh random nonce.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use rand::RngCore;

use crate::error::CryptoError;
use crate::shared_key::SharedKey;

const NONCE_SIZE: usize = 12; // 96-bit nonce for AES-256-GCM
const TAG_SIZE: usize = 16;
const BASE64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// Encrypts and decrypts message bodies with the process-wide shared key.
///
/// Immutable once built; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct MessageCipher {
    key: SharedKey,
}

impl MessageCipher {
    pub fn new(key: SharedKey) -> Self {
        Self { key }
    }

    /// Convenience for `MessageCipher::new(SharedKey::from_secret(secret)?)`.
    pub fn from_secret(secret: &str) -> Result<Self, CryptoError> {
        Ok(Self::new(SharedKey::from_secret(secret)?))
    }

    /// Encrypt a UTF-8 plaintext into a base64 string safe to store as text.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);

        let cipher = self.cipher()?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut data = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        data.extend_from_slice(&nonce_bytes);
        data.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(data))
    }

    /// Decrypt a base64 ciphertext, reporting why it could not be read.
    pub fn try_decrypt(&self, ciphertext: &str) -> Result<String, CryptoError> {
        let data = BASE64.decode(ciphertext.trim())?;
        if data.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::DecryptionFailed(
                "ciphertext too short to contain nonce and tag".into(),
            ));
        }

        let (nonce_bytes, ciphertext_with_tag) = data.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher()?
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext_with_tag)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

        Ok(String::from_utf8(plaintext)?)
    }

    /// Decrypt a base64 ciphertext, resolving any failure to an empty string.
    pub fn decrypt(&self, ciphertext: &str) -> String {
        match self.try_decrypt(ciphertext) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                tracing::debug!(error = %e, "message body could not be decrypted");
                String::new()
            }
        }
    }

    fn cipher(&self) -> Result<Aes256Gcm, CryptoError> {
        Aes256Gcm::new_from_slice(self.key.as_bytes())
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }
}
