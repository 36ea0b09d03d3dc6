use std::collections::BTreeSet;

use crate::ids::{ConversationId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A conversation record as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub participants: BTreeSet<UserId>,
    /// Free-form metadata written by create-if-missing calls.
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

/// Metadata merged into a conversation by create-if-missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationPatch {
    #[serde(default)]
    pub participants: BTreeSet<UserId>,
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl ConversationPatch {
    pub fn with_participants<I, U>(participants: I) -> Self
    where
        I: IntoIterator<Item = U>,
        U: Into<UserId>,
    {
        Self {
            participants: participants.into_iter().map(Into::into).collect(),
            fields: serde_json::Map::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty() && self.fields.is_empty()
    }

    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

impl Conversation {
    /// Build a fresh record from the first patch seen for `id`.
    pub fn from_patch(id: ConversationId, patch: ConversationPatch, now: DateTime<Utc>) -> Self {
        Self {
            id,
            participants: patch.participants,
            fields: patch.fields,
            updated_at: now,
        }
    }

    /// Merge `patch` without dropping anything already recorded.
    ///
    /// Participants are unioned; fields merge per key with the patch winning;
    /// `updated_at` is always refreshed.
    pub fn merge(&mut self, patch: ConversationPatch, now: DateTime<Utc>) {
        self.participants.extend(patch.participants);
        for (key, value) in patch.fields {
            self.fields.insert(key, value);
        }
        self.updated_at = now;
    }
}
