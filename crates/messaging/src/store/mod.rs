//! Conversation store gateway.
//!
//! The gateway speaks to a document store laid out as
//! `conversations/{id}` records with a `messages` sub-collection. Any backend
//! offering upsert-merge writes, append-with-server-timestamp writes, and
//! ordered live queries satisfies [`ConversationStore`].

pub mod memory;

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use healio_shared::api::conversation::{Conversation, ConversationPatch};
use healio_shared::api::message::{OutgoingMessage, RawMessage};
use healio_shared::ids::{ConversationId, MessageId};

use crate::error::StoreError;

pub use memory::MemoryStore;

/// One full view of a conversation's messages, newest first.
pub type Snapshot = Vec<RawMessage>;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create the conversation record, or merge `patch` into the existing one.
    ///
    /// Idempotent. `updated_at` is set to server time on every call.
    async fn create_conversation_if_missing(
        &self,
        conversation_id: &ConversationId,
        patch: ConversationPatch,
    ) -> Result<(), StoreError>;

    /// Append a message. The store assigns the id and `createdAt`.
    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        message: OutgoingMessage,
    ) -> Result<MessageId, StoreError>;

    /// Open a live query over the conversation's messages ordered by
    /// `createdAt` descending.
    ///
    /// Every item is a full snapshot; the first is the initial load. Transport
    /// failures arrive as `Err` items and are not retried.
    async fn subscribe_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<MessageSubscription, StoreError>;

    async fn fetch_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Conversation>, StoreError>;

    /// One-shot read with the same ordering as [`subscribe_messages`](Self::subscribe_messages).
    async fn fetch_messages(&self, conversation_id: &ConversationId)
        -> Result<Snapshot, StoreError>;
}

/// A live message query. Dropping it unsubscribes.
pub struct MessageSubscription {
    conversation_id: ConversationId,
    snapshots: BoxStream<'static, Result<Snapshot, StoreError>>,
}

impl MessageSubscription {
    pub fn new<S>(conversation_id: ConversationId, snapshots: S) -> Self
    where
        S: Stream<Item = Result<Snapshot, StoreError>> + Send + 'static,
    {
        Self {
            conversation_id,
            snapshots: snapshots.boxed(),
        }
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    /// Tear the subscription down explicitly.
    pub fn unsubscribe(self) {
        tracing::debug!(conversation_id = %self.conversation_id, "unsubscribed from messages");
    }
}

impl Stream for MessageSubscription {
    type Item = Result<Snapshot, StoreError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.snapshots.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for MessageSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSubscription")
            .field("conversation_id", &self.conversation_id)
            .finish_non_exhaustive()
    }
}

pub fn conversation_path(conversation_id: &ConversationId) -> String {
    format!("conversations/{conversation_id}")
}

pub fn messages_path(conversation_id: &ConversationId) -> String {
    format!("conversations/{conversation_id}/messages")
}
