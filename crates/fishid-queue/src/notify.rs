//! Result notifications via Redis Pub/Sub.
//!
//! Publishing is best effort: subscribers that are not connected miss the
//! message, and callers ignore publish failures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fishid_models::{ResultStatus, WorkItemId};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{QueueError, QueueResult};

/// Human-readable outcome announcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub work_item_id: WorkItemId,
    pub status: ResultStatus,
    pub subject: String,
    pub message: String,
    pub published_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        work_item_id: WorkItemId,
        status: ResultStatus,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            work_item_id,
            status,
            subject: subject.into(),
            message: message.into(),
            published_at: Utc::now(),
        }
    }
}

/// Sink for outcome notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, notification: &Notification) -> QueueResult<()>;
}

/// Notifier configuration.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub redis_url: String,
    /// Channel carrying every notification
    pub channel: String,
    pub enabled: bool,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            channel: "fishid:notifications".to_string(),
            enabled: true,
        }
    }
}

impl NotifierConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            channel: std::env::var("NOTIFY_CHANNEL").unwrap_or(defaults.channel),
            enabled: std::env::var("NOTIFY_ENABLED")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.enabled),
        }
    }
}

/// Publishes notifications to a Redis channel and a per-item channel.
pub struct RedisNotifier {
    client: redis::Client,
    channel: String,
}

impl RedisNotifier {
    pub fn new(config: &NotifierConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            channel: config.channel.clone(),
        })
    }

    /// Channel dedicated to one work item.
    pub fn item_channel(&self, work_item_id: &WorkItemId) -> String {
        format!("{}:{}", self.channel, work_item_id)
    }
}

#[async_trait]
impl Notifier for RedisNotifier {
    async fn publish(&self, notification: &Notification) -> QueueResult<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::PublishFailed(e.to_string()))?;
        let payload = serde_json::to_string(notification)?;

        debug!(
            work_item_id = %notification.work_item_id,
            channel = %self.channel,
            "Publishing notification"
        );
        conn.publish::<_, _, ()>(&self.channel, &payload).await?;
        conn.publish::<_, _, ()>(self.item_channel(&notification.work_item_id), &payload)
            .await?;

        Ok(())
    }
}

/// Notifier that records what it was asked to publish.
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    published: Mutex<Vec<Notification>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn published(&self) -> Vec<Notification> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn publish(&self, notification: &Notification) -> QueueResult<()> {
        self.published.lock().await.push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_notifier_records() {
        let notifier = MemoryNotifier::new();
        let notification = Notification::new(
            WorkItemId::from_string("item-0001"),
            ResultStatus::Completed,
            "Result: Salema",
            "Identified: Salema",
        );
        notifier.publish(&notification).await.unwrap();
        assert_eq!(notifier.published().await, vec![notification]);
    }

    #[test]
    fn test_item_channel() {
        let notifier = RedisNotifier::new(&NotifierConfig::default()).unwrap();
        assert_eq!(
            notifier.item_channel(&WorkItemId::from_string("abc")),
            "fishid:notifications:abc"
        );
    }
}
