//! healio-crypto — message body encryption for Healio conversations.
//!
//! Derives a single AES-256 key from the configured pre-shared secret and
//! encrypts message bodies with AES-256-GCM into text-safe base64 strings.
//! Decryption at the public boundary never fails: unreadable ciphertext
//! resolves to an empty body so one bad document cannot break a conversation.

pub mod cipher;
pub mod error;
pub mod shared_key;
