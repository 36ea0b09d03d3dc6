/// Shared error type used across the crypto and messaging crates.
#[derive(Debug, thiserror::Error)]
pub enum HealioError {
    #[error("forbidden")]
    Forbidden,

    #[error("validation error: {0}")]
    Validation(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}
