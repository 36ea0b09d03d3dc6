//! Turns raw store snapshots into the plaintext list a chat view renders.

use chrono::{DateTime, Utc};
use healio_crypto::cipher::MessageCipher;
use healio_shared::api::message::RawMessage;
use healio_shared::ids::MessageId;
use serde::Serialize;

use crate::author::{normalize_author, Author};

/// A decrypted, display-ready message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(rename = "_id")]
    pub id: MessageId,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub user: Author,
    /// The store has not resolved `created_at` yet; the time shown is local.
    pub pending: bool,
}

/// Map a snapshot in whatever order the store delivered it to a list in
/// ascending `created_at` order, ties broken by message id.
pub fn map_snapshot(cipher: &MessageCipher, snapshot: Vec<RawMessage>) -> Vec<ChatMessage> {
    let now = Utc::now();
    let mut messages: Vec<ChatMessage> = snapshot
        .iter()
        .map(|raw| map_message(cipher, raw, now))
        .collect();
    messages.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    messages
}

/// `now` stands in for pending or unreadable timestamps.
pub fn map_message(cipher: &MessageCipher, raw: &RawMessage, now: DateTime<Utc>) -> ChatMessage {
    let resolved = raw.created_at.and_then(|ts| ts.to_instant());
    ChatMessage {
        id: raw.id.clone(),
        text: resolve_text(cipher, raw),
        created_at: resolved.unwrap_or(now),
        user: normalize_author(raw),
        pending: resolved.is_none(),
    }
}

/// Decrypt `encryptedBody` when present, else fall back to the legacy
/// plaintext `body`, else empty.
pub fn resolve_text(cipher: &MessageCipher, raw: &RawMessage) -> String {
    match raw.encrypted_body.as_deref().filter(|b| !b.is_empty()) {
        Some(ciphertext) => cipher.decrypt(ciphertext),
        None => raw.body.clone().unwrap_or_default(),
    }
}
