//! Durable work queue and notification channel.
//!
//! This crate provides:
//! - The `WorkQueue` abstraction with lease-based, at-least-once delivery
//! - A Redis Streams implementation with visibility timeout and DLQ
//! - An in-memory implementation driven by the tokio clock
//! - Best-effort result notifications via Redis Pub/Sub

pub mod error;
pub mod memory;
pub mod message;
pub mod notify;
pub mod queue;
pub mod redis_queue;

pub use error::{QueueError, QueueResult};
pub use memory::MemoryWorkQueue;
pub use message::{DeadLetter, QueueMessage};
pub use notify::{MemoryNotifier, Notification, Notifier, NotifierConfig, RedisNotifier};
pub use queue::{QueueConfig, WorkQueue};
pub use redis_queue::RedisWorkQueue;
