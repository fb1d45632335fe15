use std::time::Duration;

/// Failure talking to the shared counter store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("unexpected store reply: {0}")]
    Reply(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LimiterError {
    #[error("counter store error: {0}")]
    Store(#[from] StoreError),

    #[error("counter store did not answer within {0:?}")]
    Timeout(Duration),

    #[error("invalid rate rule for {path}: {reason}")]
    InvalidRule { path: String, reason: String },
}

pub type Result<T> = std::result::Result<T, LimiterError>;
