//! Test doubles and helpers shared by the messaging integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use healio_crypto::cipher::MessageCipher;
use healio_messaging::error::StoreError;
use healio_messaging::feed::ConversationFeed;
use healio_messaging::mapping::ChatMessage;
use healio_messaging::store::{ConversationStore, MessageSubscription, Snapshot};
use healio_shared::api::conversation::{Conversation, ConversationPatch};
use healio_shared::api::message::{OutgoingMessage, RawMessage};
use healio_shared::api::timestamp::StoreTimestamp;
use healio_shared::ids::{ConversationId, MessageId};

pub const SECRET: &str = "integration-shared-secret";

pub fn cipher() -> Arc<MessageCipher> {
    Arc::new(MessageCipher::from_secret(SECRET).unwrap())
}

type SnapshotSender = mpsc::UnboundedSender<Result<Snapshot, StoreError>>;

/// A store whose subscriptions are driven by the test: nothing is delivered
/// until [`ScriptedStore::push`] is called.
#[derive(Default)]
pub struct ScriptedStore {
    subscribers: Mutex<HashMap<ConversationId, Vec<SnapshotSender>>>,
    pub appended: Mutex<Vec<(ConversationId, OutgoingMessage)>>,
    pub upserts: AtomicUsize,
    pub fail_appends: AtomicBool,
    pub fail_upserts: AtomicBool,
}

impl ScriptedStore {
    /// Push a snapshot to every subscriber of `conversation_id` that is still
    /// listening. Returns how many received it.
    pub fn push(&self, conversation_id: &str, snapshot: Snapshot) -> usize {
        self.send(conversation_id, Ok(snapshot))
    }

    pub fn fail(&self, conversation_id: &str, detail: &str) -> usize {
        self.send(
            conversation_id,
            Err(StoreError::Subscription {
                path: format!("conversations/{conversation_id}/messages"),
                detail: detail.to_string(),
            }),
        )
    }

    /// Subscriptions whose receiving side is still alive.
    pub fn live_subscriptions(&self, conversation_id: &str) -> usize {
        self.subscribers
            .lock()
            .unwrap()
            .get(&ConversationId::from(conversation_id))
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    pub fn append_count(&self) -> usize {
        self.appended.lock().unwrap().len()
    }

    fn send(&self, conversation_id: &str, item: Result<Snapshot, StoreError>) -> usize {
        let subscribers = self.subscribers.lock().unwrap();
        subscribers
            .get(&ConversationId::from(conversation_id))
            .map(|senders| {
                senders
                    .iter()
                    .filter(|tx| tx.unbounded_send(item.clone()).is_ok())
                    .count()
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl ConversationStore for ScriptedStore {
    async fn create_conversation_if_missing(
        &self,
        conversation_id: &ConversationId,
        _patch: ConversationPatch,
    ) -> Result<(), StoreError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(StoreError::Write {
                path: format!("conversations/{conversation_id}"),
                detail: "scripted upsert failure".into(),
            });
        }
        Ok(())
    }

    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        message: OutgoingMessage,
    ) -> Result<MessageId, StoreError> {
        self.appended
            .lock()
            .unwrap()
            .push((conversation_id.clone(), message));
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(StoreError::Write {
                path: format!("conversations/{conversation_id}/messages"),
                detail: "scripted append failure".into(),
            });
        }
        Ok(MessageId::generate())
    }

    async fn subscribe_messages(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<MessageSubscription, StoreError> {
        let (tx, rx) = mpsc::unbounded();
        self.subscribers
            .lock()
            .unwrap()
            .entry(conversation_id.clone())
            .or_default()
            .push(tx);
        Ok(MessageSubscription::new(conversation_id.clone(), rx))
    }

    async fn fetch_conversation(
        &self,
        _conversation_id: &ConversationId,
    ) -> Result<Option<Conversation>, StoreError> {
        Ok(None)
    }

    async fn fetch_messages(
        &self,
        _conversation_id: &ConversationId,
    ) -> Result<Snapshot, StoreError> {
        Ok(Vec::new())
    }
}

pub fn raw_plain(id: &str, body: &str, seconds: i64) -> RawMessage {
    RawMessage {
        id: MessageId::from(id),
        body: Some(body.to_string()),
        sender: Some("u-legacy".into()),
        sender_name: Some("Legacy".into()),
        created_at: Some(StoreTimestamp::Native {
            seconds,
            nanoseconds: 0,
        }),
        ..Default::default()
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met within 2s");
}

/// Wait until the feed's message list satisfies `predicate`.
pub async fn wait_for_messages<S, F>(feed: &ConversationFeed<S>, mut predicate: F) -> Vec<ChatMessage>
where
    S: ConversationStore + 'static,
    F: FnMut(&[ChatMessage]) -> bool,
{
    let mut rx = feed.watch();
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            {
                let current = rx.borrow_and_update();
                if predicate(current.as_slice()) {
                    return current.clone();
                }
            }
            rx.changed().await.expect("feed dropped");
        }
    })
    .await
    .expect("messages did not reach expected state within 2s")
}
