//! Result store error types.

use thiserror::Error;

pub type ResultStoreResult<T> = Result<T, ResultStoreError>;

#[derive(Debug, Error)]
pub enum ResultStoreError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt record for {id}: {reason}")]
    CorruptRecord { id: String, reason: String },

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ResultStoreError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Whether repeating the call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ResultStoreError::ConnectionFailed(_) | ResultStoreError::Unavailable(_) => true,
            ResultStoreError::Redis(e) => {
                e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal()
            }
            ResultStoreError::CorruptRecord { .. } | ResultStoreError::Json(_) => false,
        }
    }
}
