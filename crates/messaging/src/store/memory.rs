//! In-process realtime conversation store.
//!
//! Holds conversations and their message collections in `DashMap`s and fans
//! out full snapshots to subscribers over one `broadcast` channel per
//! conversation. Snapshots are published while the collection's shard lock is
//! held, so subscribers observe them in mutation order.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use futures::stream::{self, StreamExt};
use healio_shared::api::conversation::{Conversation, ConversationPatch};
use healio_shared::api::message::{OutgoingMessage, RawMessage};
use healio_shared::api::timestamp::StoreTimestamp;
use healio_shared::constants::DEFAULT_SNAPSHOT_BUFFER;
use healio_shared::ids::{ConversationId, MessageId};
use tokio::sync::broadcast;

use super::{conversation_path, messages_path, ConversationStore, MessageSubscription, Snapshot};
use crate::error::StoreError;

type SnapshotEvent = Result<Arc<Snapshot>, StoreError>;

pub struct MemoryStore {
    conversations: DashMap<ConversationId, Conversation>,
    messages: DashMap<ConversationId, Vec<RawMessage>>,
    feeds: DashMap<ConversationId, broadcast::Sender<SnapshotEvent>>,
    revoked: DashSet<ConversationId>,
    snapshot_buffer: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_snapshot_buffer(DEFAULT_SNAPSHOT_BUFFER)
    }

    /// Subscribers more than `snapshot_buffer` snapshots behind skip ahead to
    /// the newest one.
    pub fn with_snapshot_buffer(snapshot_buffer: usize) -> Self {
        Self {
            conversations: DashMap::new(),
            messages: DashMap::new(),
            feeds: DashMap::new(),
            revoked: DashSet::new(),
            snapshot_buffer: snapshot_buffer.max(1),
        }
    }

    /// Insert a document exactly as given, bypassing id and timestamp
    /// assignment. Used to load documents written by older clients.
    pub fn insert_document(&self, conversation_id: &ConversationId, message: RawMessage) {
        let mut collection = self.messages.entry(conversation_id.clone()).or_default();
        collection.push(message);
        self.publish(conversation_id, Ok(Arc::new(sorted_snapshot(&collection))));
    }

    /// Deny all reads and writes on a conversation until [`restore_access`](Self::restore_access).
    pub fn revoke_access(&self, conversation_id: &ConversationId) {
        self.revoked.insert(conversation_id.clone());
    }

    pub fn restore_access(&self, conversation_id: &ConversationId) {
        self.revoked.remove(conversation_id);
    }

    /// Deliver a transport failure to every live subscriber of a conversation.
    pub fn interrupt_subscriptions(&self, conversation_id: &ConversationId, detail: &str) {
        let _guard = self.messages.entry(conversation_id.clone()).or_default();
        self.publish(
            conversation_id,
            Err(StoreError::Subscription {
                path: messages_path(conversation_id),
                detail: detail.to_string(),
            }),
        );
    }

    /// Number of live subscriptions on a conversation.
    pub fn subscriber_count(&self, conversation_id: &ConversationId) -> usize {
        self.feeds
            .get(conversation_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    fn check_access(&self, conversation_id: &ConversationId, path: String) -> Result<(), StoreError> {
        if self.revoked.contains(conversation_id) {
            return Err(StoreError::PermissionDenied { path });
        }
        Ok(())
    }

    /// Must be called while the conversation's `messages` entry is held.
    fn publish(&self, conversation_id: &ConversationId, event: SnapshotEvent) {
        let delivered = match self.feeds.get(conversation_id) {
            Some(tx) => tx.send(event).is_ok(),
            None => return,
        };
        if !delivered {
            self.feeds
                .remove_if(conversation_id, |_, tx| tx.receiver_count() == 0);
        }
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create_conversation_if_missing(
        &self,
        conversation_id: &ConversationId,
        patch: ConversationPatch,
    ) -> Result<(), StoreError> {
        self.check_access(conversation_id, conversation_path(conversation_id))?;

        let now = Utc::now();
        match self.conversations.entry(conversation_id.clone()) {
            Entry::Occupied(mut entry) => entry.get_mut().merge(patch, now),
            Entry::Vacant(entry) => {
                entry.insert(Conversation::from_patch(conversation_id.clone(), patch, now));
                tracing::debug!(conversation_id = %conversation_id, "conversation created");
            }
        }
        Ok(())
    }

    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        message: OutgoingMessage,
    ) -> Result<MessageId, StoreError> {
        self.check_access(conversation_id, messages_path(conversation_id))?;

        let id = MessageId::generate();
        let created_at = StoreTimestamp::from_instant(Utc::now());

        let mut collection = self.messages.entry(conversation_id.clone()).or_default();
        collection.push(message.into_raw(id.clone(), Some(created_at)));
        self.publish(conversation_id, Ok(Arc::new(sorted_snapshot(&collection))));

        Ok(id)
    }

    async fn subscribe_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<MessageSubscription, StoreError> {
        self.check_access(conversation_id, messages_path(conversation_id))?;

        // Hold the collection while subscribing so no mutation slips between
        // the initial snapshot and the first live one.
        let collection = self.messages.entry(conversation_id.clone()).or_default();
        let rx = self
            .feeds
            .entry(conversation_id.clone())
            .or_insert_with(|| broadcast::channel(self.snapshot_buffer).0)
            .subscribe();
        let initial = sorted_snapshot(&collection);
        drop(collection);

        let live = stream::unfold(
            (rx, conversation_id.clone()),
            |(mut rx, conversation_id)| async move {
                let mut lagged = false;
                loop {
                    match rx.recv().await {
                        Ok(event) => {
                            let event = if lagged {
                                newest_retained(&mut rx, event)
                            } else {
                                event
                            };
                            let item = event.map(|snapshot| snapshot.as_ref().clone());
                            return Some((item, (rx, conversation_id)));
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(
                                conversation_id = %conversation_id,
                                skipped = n,
                                "subscriber lagged, skipping to newest snapshot"
                            );
                            lagged = true;
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            },
        );

        let snapshots = stream::once(async move { Ok(initial) }).chain(live);
        Ok(MessageSubscription::new(conversation_id.clone(), snapshots))
    }

    async fn fetch_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Option<Conversation>, StoreError> {
        self.check_access(conversation_id, conversation_path(conversation_id))?;
        Ok(self
            .conversations
            .get(conversation_id)
            .map(|c| c.value().clone()))
    }

    async fn fetch_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Snapshot, StoreError> {
        self.check_access(conversation_id, messages_path(conversation_id))?;
        Ok(self
            .messages
            .get(conversation_id)
            .map(|collection| sorted_snapshot(&collection))
            .unwrap_or_default())
    }
}

/// Drain everything already buffered behind `event` and return the last
/// snapshot. A subscription error ends the drain and is returned as is.
fn newest_retained(
    rx: &mut broadcast::Receiver<SnapshotEvent>,
    mut event: SnapshotEvent,
) -> SnapshotEvent {
    while event.is_ok() {
        match rx.try_recv() {
            Ok(next) => event = next,
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    event
}

/// Newest first. Pending timestamps sort as newest, ties break on id.
fn sorted_snapshot(collection: &[RawMessage]) -> Snapshot {
    let mut snapshot = collection.to_vec();
    snapshot.sort_by(|a, b| sort_key(b).cmp(&sort_key(a)));
    snapshot
}

fn sort_key(message: &RawMessage) -> (bool, Option<DateTime<Utc>>, &MessageId) {
    (
        message.created_at.is_none(),
        message.created_at.and_then(|ts| ts.to_instant()),
        &message.id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use healio_shared::api::message::UserProfile;

    fn outgoing(body: &str) -> OutgoingMessage {
        OutgoingMessage {
            encrypted_body: body.into(),
            sender: "u1".into(),
            sender_name: Some("Alice".into()),
            sender_avatar: None,
            sender_role: None,
            user: UserProfile {
                legacy_id: Some("u1".into()),
                name: Some("Alice".into()),
                ..Default::default()
            },
        }
    }

    fn conv(id: &str) -> ConversationId {
        ConversationId::from(id)
    }

    #[tokio::test]
    async fn create_if_missing_twice_merges_into_one_record() {
        let store = MemoryStore::new();
        let id = conv("c1");

        store
            .create_conversation_if_missing(
                &id,
                ConversationPatch::with_participants(["u1", "u2"])
                    .with_field("title", serde_json::json!("Check-in")),
            )
            .await
            .unwrap();
        let first = store.fetch_conversation(&id).await.unwrap().unwrap();

        store
            .create_conversation_if_missing(
                &id,
                ConversationPatch::default().with_field("mood", serde_json::json!("calm")),
            )
            .await
            .unwrap();
        let second = store.fetch_conversation(&id).await.unwrap().unwrap();

        assert_eq!(store.conversations.len(), 1);
        assert_eq!(second.participants.len(), 2);
        assert_eq!(second.fields["title"], "Check-in");
        assert_eq!(second.fields["mood"], "calm");
        assert!(second.updated_at >= first.updated_at);
    }

    #[tokio::test]
    async fn append_assigns_id_and_timestamp() {
        let store = MemoryStore::new();
        let id = conv("c1");
        let message_id = store.append_message(&id, outgoing("x")).await.unwrap();

        let messages = store.fetch_messages(&id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, message_id);
        assert!(messages[0].created_at.unwrap().to_instant().is_some());
        assert_eq!(messages[0].encrypted_body.as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn fetch_messages_is_newest_first() {
        let store = MemoryStore::new();
        let id = conv("c1");
        let old = RawMessage {
            id: MessageId::from("m-old"),
            body: Some("old".into()),
            created_at: Some(StoreTimestamp::Native {
                seconds: 1_000,
                nanoseconds: 0,
            }),
            ..Default::default()
        };
        let new = RawMessage {
            id: MessageId::from("m-new"),
            body: Some("new".into()),
            created_at: Some(StoreTimestamp::Native {
                seconds: 2_000,
                nanoseconds: 0,
            }),
            ..Default::default()
        };
        let pending = RawMessage {
            id: MessageId::from("m-pending"),
            body: Some("pending".into()),
            ..Default::default()
        };
        store.insert_document(&id, old);
        store.insert_document(&id, pending);
        store.insert_document(&id, new);

        let ids: Vec<_> = store
            .fetch_messages(&id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id.0)
            .collect();
        assert_eq!(ids, vec!["m-pending", "m-new", "m-old"]);
    }

    #[tokio::test]
    async fn subscription_starts_with_full_snapshot_then_follows_changes() {
        let store = MemoryStore::new();
        let id = conv("c1");
        store.append_message(&id, outgoing("first")).await.unwrap();

        let mut sub = store.subscribe_messages(&id).await.unwrap();
        let initial = sub.next().await.unwrap().unwrap();
        assert_eq!(initial.len(), 1);

        store.append_message(&id, outgoing("second")).await.unwrap();
        let next = sub.next().await.unwrap().unwrap();
        assert_eq!(next.len(), 2);
        assert_eq!(next[0].encrypted_body.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn subscriptions_are_isolated_per_conversation() {
        let store = MemoryStore::new();
        let mut sub_a = store.subscribe_messages(&conv("a")).await.unwrap();
        assert!(sub_a.next().await.unwrap().unwrap().is_empty());

        store.append_message(&conv("b"), outgoing("b1")).await.unwrap();
        store.append_message(&conv("a"), outgoing("a1")).await.unwrap();

        let snapshot = sub_a.next().await.unwrap().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].encrypted_body.as_deref(), Some("a1"));
    }

    #[tokio::test]
    async fn dropping_subscription_releases_receiver() {
        let store = MemoryStore::new();
        let id = conv("c1");
        let sub = store.subscribe_messages(&id).await.unwrap();
        assert_eq!(store.subscriber_count(&id), 1);
        sub.unsubscribe();
        assert_eq!(store.subscriber_count(&id), 0);

        // Publishing with no receivers prunes the channel.
        store.append_message(&id, outgoing("x")).await.unwrap();
        assert!(store.feeds.get(&id).is_none());
    }

    #[tokio::test]
    async fn revoked_conversation_rejects_writes_and_subscriptions() {
        let store = MemoryStore::new();
        let id = conv("c1");
        store.revoke_access(&id);

        let err = store.append_message(&id, outgoing("x")).await.unwrap_err();
        assert!(matches!(err, StoreError::PermissionDenied { .. }));
        let err = store
            .create_conversation_if_missing(&id, ConversationPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PermissionDenied { .. }));
        assert!(store.subscribe_messages(&id).await.is_err());

        store.restore_access(&id);
        assert!(store.append_message(&id, outgoing("x")).await.is_ok());
    }

    #[tokio::test]
    async fn interrupt_delivers_subscription_error() {
        let store = MemoryStore::new();
        let id = conv("c1");
        let mut sub = store.subscribe_messages(&id).await.unwrap();
        let _ = sub.next().await;

        store.interrupt_subscriptions(&id, "connection reset");
        match sub.next().await {
            Some(Err(StoreError::Subscription { detail, .. })) => {
                assert_eq!(detail, "connection reset");
            }
            other => panic!("expected subscription error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_to_newest_snapshot() {
        let store = MemoryStore::with_snapshot_buffer(2);
        let id = conv("c1");
        let mut sub = store.subscribe_messages(&id).await.unwrap();
        let _ = sub.next().await;

        for i in 0..5 {
            store
                .append_message(&id, outgoing(&format!("m{i}")))
                .await
                .unwrap();
        }

        let mut sizes = Vec::new();
        while let Ok(Some(item)) =
            tokio::time::timeout(std::time::Duration::from_millis(50), sub.next()).await
        {
            sizes.push(item.unwrap().len());
        }
        assert_eq!(sizes, vec![5]);
    }

    #[tokio::test]
    async fn lagging_subscriber_still_sees_interruption() {
        let store = MemoryStore::with_snapshot_buffer(2);
        let id = conv("c1");
        let mut sub = store.subscribe_messages(&id).await.unwrap();
        let _ = sub.next().await;

        for i in 0..4 {
            store
                .append_message(&id, outgoing(&format!("m{i}")))
                .await
                .unwrap();
        }
        store.interrupt_subscriptions(&id, "connection reset");

        assert!(matches!(
            sub.next().await,
            Some(Err(StoreError::Subscription { .. }))
        ));
    }
}
