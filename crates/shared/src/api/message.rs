use crate::api::timestamp::StoreTimestamp;
use crate::ids::MessageId;
use serde::{Deserialize, Serialize};

/// A user's identity as it appears on message documents and as the caller
/// supplies it when sending.
///
/// Older clients wrote the identifier as `_id`, newer ones as `id`; both are
/// accepted and `_id` wins when both are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub legacy_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl UserProfile {
    /// The caller's identifier: `_id`, else `id`. Empty strings count as absent.
    pub fn resolved_id(&self) -> Option<&str> {
        non_empty(self.legacy_id.as_deref()).or_else(|| non_empty(self.id.as_deref()))
    }
}

/// A message document as stored, before decryption or normalization.
///
/// Every field except `id` is optional because the collection holds documents
/// written by several client generations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    pub id: MessageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
    /// `None` while the server timestamp is still pending.
    #[serde(default)]
    pub created_at: Option<StoreTimestamp>,
}

/// Payload the client hands to the store when appending a message.
///
/// Sender identity is written twice, flat and as a nested `user`, so readers
/// expecting either shape find it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub encrypted_body: String,
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_role: Option<String>,
    pub user: UserProfile,
}

impl OutgoingMessage {
    /// Materialize the stored document once the store has assigned an id and
    /// a creation time.
    pub fn into_raw(self, id: MessageId, created_at: Option<StoreTimestamp>) -> RawMessage {
        RawMessage {
            id,
            body: None,
            encrypted_body: Some(self.encrypted_body),
            sender: Some(self.sender),
            sender_name: self.sender_name,
            sender_avatar: self.sender_avatar,
            sender_role: self.sender_role,
            user: Some(self.user),
            created_at,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
