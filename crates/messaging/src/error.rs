//! Error types for the healio-messaging crate.

use healio_crypto::error::CryptoError;
use healio_shared::error::HealioError;
use thiserror::Error;

/// Failures reported by a conversation store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// An upsert or append could not be written (network, unreachable path).
    #[error("write to {path} failed: {detail}")]
    Write { path: String, detail: String },

    /// The caller may not read or write this path.
    #[error("permission denied for {path}")]
    PermissionDenied { path: String },

    /// The live subscription transport failed. Subscriptions are not retried.
    #[error("subscription to {path} failed: {detail}")]
    Subscription { path: String, detail: String },
}

/// Why `send_message` declined to write anything.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractViolation {
    #[error("no conversation is bound")]
    NotBound,

    #[error("message text is empty")]
    EmptyMessage,

    #[error("sender has no id or _id")]
    MissingSenderId,

    #[error("message is {size} bytes, limit is {max}")]
    MessageTooLarge { size: usize, max: usize },
}

/// Errors raised inside the messaging layer. They stop at the feed boundary,
/// where they are logged and turned into no-ops.
#[derive(Debug, Error)]
pub enum MessagingError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Cipher(#[from] CryptoError),

    #[error("caller contract violated: {0}")]
    CallerContract(#[from] ContractViolation),
}

impl From<StoreError> for HealioError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::PermissionDenied { .. } => HealioError::Forbidden,
            other => HealioError::ServiceUnavailable(other.to_string()),
        }
    }
}

impl From<MessagingError> for HealioError {
    fn from(err: MessagingError) -> Self {
        match err {
            MessagingError::Store(e) => e.into(),
            MessagingError::Cipher(e) => e.into(),
            MessagingError::CallerContract(e) => HealioError::Validation(e.to_string()),
        }
    }
}
