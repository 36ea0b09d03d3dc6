//! Author normalization for message documents.
//!
//! Documents carry sender identity in up to two shapes: a nested `user`
//! object and flat `sender*` fields. Resolution order for every attribute is
//! `user.*`, then `sender*`, then a fixed default. Empty strings count as
//! absent.

use healio_shared::api::message::RawMessage;
use healio_shared::constants::{DEFAULT_AUTHOR_ROLE, UNKNOWN_AUTHOR_ID, UNKNOWN_AUTHOR_NAME};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub role: String,
}

pub fn normalize_author(message: &RawMessage) -> Author {
    let user = message.user.as_ref();

    let id = user
        .and_then(|u| u.resolved_id())
        .or_else(|| present(&message.sender))
        .unwrap_or(UNKNOWN_AUTHOR_ID);
    let name = user
        .and_then(|u| present(&u.name))
        .or_else(|| present(&message.sender_name))
        .unwrap_or(UNKNOWN_AUTHOR_NAME);
    let avatar = user
        .and_then(|u| present(&u.avatar))
        .or_else(|| present(&message.sender_avatar));
    let role = user
        .and_then(|u| present(&u.role))
        .or_else(|| present(&message.sender_role))
        .unwrap_or(DEFAULT_AUTHOR_ROLE);

    Author {
        id: id.to_string(),
        name: name.to_string(),
        avatar: avatar.map(str::to_string),
        role: role.to_string(),
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
