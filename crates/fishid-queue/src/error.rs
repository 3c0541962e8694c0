//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Enqueue failed: {0}")]
    EnqueueFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Event does not belong to a work item: {0}")]
    InvalidEvent(String),

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn enqueue_failed(msg: impl Into<String>) -> Self {
        Self::EnqueueFailed(msg.into())
    }

    pub fn invalid_event(key: impl Into<String>) -> Self {
        Self::InvalidEvent(key.into())
    }

    /// Whether the operation may succeed if repeated.
    pub fn is_retryable(&self) -> bool {
        match self {
            QueueError::ConnectionFailed(_)
            | QueueError::EnqueueFailed(_)
            | QueueError::ReceiveFailed(_)
            | QueueError::PublishFailed(_) => true,
            QueueError::Redis(e) => {
                e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal()
            }
            QueueError::InvalidEvent(_) | QueueError::Json(_) => false,
        }
    }
}
