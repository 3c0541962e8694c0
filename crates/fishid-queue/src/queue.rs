//! Work queue abstraction and configuration.

use std::time::Duration;

use async_trait::async_trait;
use fishid_models::ObjectWriteEvent;

use crate::error::QueueResult;
use crate::message::QueueMessage;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for object-write events
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter stream name
    pub dlq_stream_name: String,
    /// Deliveries allowed before a message is dead-lettered
    pub max_receive_count: u32,
    /// Lease length for a received message
    pub visibility_timeout: Duration,
    /// Long-poll wait used by workers
    pub receive_wait: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "fishid:events".to_string(),
            consumer_group: "fishid:workers".to_string(),
            dlq_stream_name: "fishid:dlq".to_string(),
            max_receive_count: 3,
            visibility_timeout: Duration::from_secs(60),
            receive_wait: Duration::from_secs(20),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM").unwrap_or(defaults.dlq_stream_name),
            max_receive_count: std::env::var("QUEUE_MAX_RECEIVE_COUNT")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_receive_count),
            visibility_timeout: Duration::from_secs(
                std::env::var("QUEUE_VISIBILITY_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.visibility_timeout.as_secs()),
            ),
            receive_wait: Duration::from_secs(
                std::env::var("QUEUE_RECEIVE_WAIT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.receive_wait.as_secs()),
            ),
        }
    }
}

/// Durable, at-least-once work queue.
///
/// Received messages are leased until their visibility deadline. A message
/// that is not acknowledged before then becomes receivable again with its
/// delivery count incremented; one that has already been delivered
/// `max_receive_count` times is moved to the dead-letter area instead.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueue an object-write event. Returns the message id.
    async fn send(&self, event: &ObjectWriteEvent) -> QueueResult<String>;

    /// Wait up to `max_wait` for messages and lease at most `max_messages`.
    async fn receive(&self, max_wait: Duration, max_messages: usize)
        -> QueueResult<Vec<QueueMessage>>;

    /// Remove a message permanently. Acking a removed message is a no-op.
    async fn ack(&self, message: &QueueMessage) -> QueueResult<()>;

    /// Messages in the queue, leased or not.
    async fn len(&self) -> QueueResult<u64>;

    /// Messages in the dead-letter area.
    async fn dead_letter_len(&self) -> QueueResult<u64>;

    /// Reachability check used by the readiness endpoint.
    async fn check_connectivity(&self) -> QueueResult<()>;
}
