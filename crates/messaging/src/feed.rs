//! Encrypted conversation feed.
//!
//! A [`ConversationFeed`] binds at most one conversation at a time. Binding
//! opens a live subscription on a background task that decrypts each snapshot
//! and publishes it on a `watch` channel; rebinding aborts that task first.
//! Every binding carries a generation number and a task may only publish
//! while its generation is current, so a late snapshot from a previous
//! conversation is discarded instead of overwriting the new one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use healio_crypto::cipher::MessageCipher;
use healio_shared::api::conversation::ConversationPatch;
use healio_shared::api::message::{OutgoingMessage, UserProfile};
use healio_shared::constants::MAX_MESSAGE_SIZE_BYTES;
use healio_shared::ids::{ConversationId, MessageId};
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::error::{ContractViolation, MessagingError};
use crate::mapping::{map_snapshot, ChatMessage};
use crate::store::ConversationStore;

pub struct ConversationFeed<S: ConversationStore + 'static> {
    store: Arc<S>,
    cipher: Arc<MessageCipher>,
    shared: Arc<FeedShared>,
}

struct FeedShared {
    binding: Mutex<Binding>,
    messages: watch::Sender<Vec<ChatMessage>>,
}

#[derive(Default)]
struct Binding {
    conversation_id: Option<ConversationId>,
    generation: u64,
    task: Option<AbortHandle>,
}

impl FeedShared {
    fn lock(&self) -> MutexGuard<'_, Binding> {
        self.binding.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the list if `generation` is still the active binding.
    fn publish(&self, generation: u64, messages: Vec<ChatMessage>) -> bool {
        let binding = self.lock();
        if binding.generation != generation {
            return false;
        }
        self.messages.send_replace(messages);
        true
    }
}

impl<S: ConversationStore + 'static> ConversationFeed<S> {
    pub fn new(store: Arc<S>, cipher: Arc<MessageCipher>) -> Self {
        let (messages, _) = watch::channel(Vec::new());
        Self {
            store,
            cipher,
            shared: Arc::new(FeedShared {
                binding: Mutex::new(Binding::default()),
                messages,
            }),
        }
    }

    /// Bind to `conversation_id`, or unbind with `None` or an empty id.
    ///
    /// Rebinding the bound conversation keeps its subscription while it is
    /// live, and resubscribes once it has failed. Must be called from within
    /// a Tokio runtime.
    pub fn bind(&self, conversation_id: Option<ConversationId>) {
        self.bind_with_metadata(conversation_id, ConversationPatch::default());
    }

    /// Like [`bind`](Self::bind), merging `patch` into the conversation record
    /// when it is ensured.
    pub fn bind_with_metadata(
        &self,
        conversation_id: Option<ConversationId>,
        patch: ConversationPatch,
    ) {
        let conversation_id = conversation_id.filter(|id| !id.as_str().is_empty());

        let mut binding = self.shared.lock();
        let live = binding.task.as_ref().is_some_and(|task| !task.is_finished());
        if binding.conversation_id == conversation_id && (conversation_id.is_none() || live) {
            if let Some(conversation_id) = conversation_id.filter(|_| !patch.is_empty()) {
                self.ensure_conversation(conversation_id, patch);
            }
            return;
        }

        binding.generation += 1;
        if let Some(task) = binding.task.take() {
            task.abort();
        }
        if let Some(previous) = binding.conversation_id.take() {
            tracing::info!(conversation_id = %previous, "conversation unbound");
        }
        self.shared.messages.send_replace(Vec::new());

        let Some(conversation_id) = conversation_id else {
            return;
        };
        binding.conversation_id = Some(conversation_id.clone());
        tracing::info!(conversation_id = %conversation_id, "conversation bound");

        self.ensure_conversation(conversation_id.clone(), patch);

        let handle = tokio::spawn(forward_snapshots(
            Arc::clone(&self.store),
            Arc::clone(&self.cipher),
            Arc::clone(&self.shared),
            conversation_id,
            binding.generation,
        ));
        binding.task = Some(handle.abort_handle());
    }

    /// Fire-and-forget upsert; failure is logged and never blocks delivery.
    fn ensure_conversation(&self, conversation_id: ConversationId, patch: ConversationPatch) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(e) = store.create_conversation_if_missing(&conversation_id, patch).await {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "failed to ensure conversation exists"
                );
            }
        });
    }

    pub fn unbind(&self) {
        self.bind(None);
    }

    pub fn conversation_id(&self) -> Option<ConversationId> {
        self.shared.lock().conversation_id.clone()
    }

    /// Current decrypted messages, oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.shared.messages.borrow().clone()
    }

    /// Reactive view of the message list. Each rebind starts from an empty list.
    pub fn watch(&self) -> watch::Receiver<Vec<ChatMessage>> {
        self.shared.messages.subscribe()
    }

    /// Encrypt and append `text` to the bound conversation.
    ///
    /// Never fails: caller mistakes and store errors are logged and the call
    /// returns normally. The message appears once the store pushes a snapshot
    /// containing it; there is no local echo.
    pub async fn send_message(&self, text: &str, sender: &UserProfile) {
        match self.try_send_message(text, sender).await {
            Ok(message_id) => {
                tracing::debug!(message_id = %message_id, "message appended");
            }
            Err(MessagingError::CallerContract(
                reason @ (ContractViolation::NotBound | ContractViolation::EmptyMessage),
            )) => {
                tracing::debug!(reason = %reason, "send skipped");
            }
            Err(MessagingError::CallerContract(reason)) => {
                tracing::warn!(reason = %reason, "send rejected");
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to send message");
            }
        }
    }

    pub(crate) async fn try_send_message(
        &self,
        text: &str,
        sender: &UserProfile,
    ) -> Result<MessageId, MessagingError> {
        let conversation_id = self
            .conversation_id()
            .ok_or(ContractViolation::NotBound)?;
        if text.is_empty() {
            return Err(ContractViolation::EmptyMessage.into());
        }
        let sender_id = sender
            .resolved_id()
            .ok_or(ContractViolation::MissingSenderId)?
            .to_string();
        if text.len() > MAX_MESSAGE_SIZE_BYTES {
            return Err(ContractViolation::MessageTooLarge {
                size: text.len(),
                max: MAX_MESSAGE_SIZE_BYTES,
            }
            .into());
        }

        let message = OutgoingMessage {
            encrypted_body: self.cipher.encrypt(text)?,
            sender: sender_id.clone(),
            sender_name: sender.name.clone(),
            sender_avatar: sender.avatar.clone(),
            sender_role: sender.role.clone(),
            user: UserProfile {
                legacy_id: Some(sender_id),
                id: None,
                name: sender.name.clone(),
                avatar: sender.avatar.clone(),
                role: sender.role.clone(),
            },
        };

        let message_id = self.store.append_message(&conversation_id, message).await?;
        Ok(message_id)
    }
}

impl<S: ConversationStore + 'static> Drop for ConversationFeed<S> {
    fn drop(&mut self) {
        let mut binding = self.shared.lock();
        binding.generation += 1;
        if let Some(task) = binding.task.take() {
            task.abort();
        }
    }
}

async fn forward_snapshots<S: ConversationStore + 'static>(
    store: Arc<S>,
    cipher: Arc<MessageCipher>,
    shared: Arc<FeedShared>,
    conversation_id: ConversationId,
    generation: u64,
) {
    let mut subscription = match store.subscribe_messages(&conversation_id).await {
        Ok(subscription) => subscription,
        Err(e) => {
            tracing::error!(
                conversation_id = %conversation_id,
                error = %e,
                "failed to subscribe to messages"
            );
            return;
        }
    };

    while let Some(event) = subscription.next().await {
        match event {
            Ok(snapshot) => {
                let count = snapshot.len();
                let messages = map_snapshot(&cipher, snapshot);
                if !shared.publish(generation, messages) {
                    tracing::debug!(
                        conversation_id = %conversation_id,
                        "discarding snapshot from stale binding"
                    );
                    break;
                }
                tracing::debug!(conversation_id = %conversation_id, count, "snapshot applied");
            }
            Err(e) => {
                tracing::error!(
                    conversation_id = %conversation_id,
                    error = %e,
                    "message subscription failed"
                );
                break;
            }
        }
    }

    subscription.unsubscribe();
}
