//! Work queue using Redis Streams.
//!
//! Each object-write event is one stream entry read through a consumer group.
//! The group's pending entries list holds the leases: an entry idle for longer
//! than the visibility timeout is re-leased with `XCLAIM`, and Redis's own
//! per-entry delivery counter is the message's delivery count.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use fishid_models::ObjectWriteEvent;
use redis::aio::MultiplexedConnection;
use redis::streams::{
    StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadReply,
};
use redis::AsyncCommands;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{QueueError, QueueResult};
use crate::message::QueueMessage;
use crate::queue::{QueueConfig, WorkQueue};

const FIELD_EVENT: &str = "event";
const FIELD_WORK_ITEM: &str = "work_item_id";

/// Redis Streams backed work queue.
pub struct RedisWorkQueue {
    client: redis::Client,
    config: QueueConfig,
    consumer_name: String,
}

impl RedisWorkQueue {
    /// Create a new queue client with a unique consumer name.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        let consumer_name = format!("consumer-{}", Uuid::new_v4());
        Ok(Self {
            client,
            config,
            consumer_name,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    /// Use a fixed consumer name, e.g. the worker id.
    pub fn with_consumer_name(mut self, name: impl Into<String>) -> Self {
        self.consumer_name = name.into();
        self
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn connection(&self) -> QueueResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    fn visibility_ms(&self) -> u64 {
        self.config.visibility_timeout.as_millis() as u64
    }

    fn lease(&self, entry: &StreamId, delivery_count: u32) -> Option<QueueMessage> {
        let event = decode_event(&entry.map)?;
        let work_item_id = event.work_item_id()?;
        Some(QueueMessage {
            message_id: entry.id.clone(),
            work_item_id,
            event,
            lease_token: format!("{}:{}", self.consumer_name, delivery_count),
            delivery_count,
            visibility_deadline: Utc::now()
                + chrono::Duration::milliseconds(self.visibility_ms() as i64),
        })
    }

    /// Remove an entry from the group and the stream.
    async fn remove(&self, conn: &mut MultiplexedConnection, message_id: &str) -> QueueResult<()> {
        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(conn)
            .await?;

        Ok(())
    }

    /// Copy a claimed, exhausted entry to the DLQ stream and drop it from the queue.
    async fn dead_letter(
        &self,
        conn: &mut MultiplexedConnection,
        entry: &StreamId,
        delivery_count: u32,
    ) -> QueueResult<()> {
        let event = entry.map.get(FIELD_EVENT).and_then(value_to_string).unwrap_or_default();
        let work_item_id = entry
            .map
            .get(FIELD_WORK_ITEM)
            .and_then(value_to_string)
            .unwrap_or_default();

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg(FIELD_EVENT)
            .arg(&event)
            .arg(FIELD_WORK_ITEM)
            .arg(&work_item_id)
            .arg("original_id")
            .arg(&entry.id)
            .arg("delivery_count")
            .arg(delivery_count)
            .arg("dead_lettered_at")
            .arg(Utc::now().to_rfc3339())
            .query_async::<()>(conn)
            .await?;

        warn!(
            message_id = %entry.id,
            work_item_id = %work_item_id,
            delivery_count,
            "Moved exhausted message to DLQ"
        );

        self.remove(conn, &entry.id).await
    }

    /// Re-lease entries whose lease expired, dead-lettering exhausted ones.
    async fn reclaim_expired(
        &self,
        conn: &mut MultiplexedConnection,
        max_messages: usize,
    ) -> QueueResult<Vec<QueueMessage>> {
        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("IDLE")
            .arg(self.visibility_ms())
            .arg("-")
            .arg("+")
            .arg(max_messages)
            .query_async(conn)
            .await?;

        let mut messages = Vec::new();

        for pending_entry in pending.ids {
            let times_delivered = pending_entry.times_delivered as u32;

            // XCLAIM re-checks the idle time, so only one consumer wins an
            // entry. Losers get an empty reply and leave it alone.
            let claimed: StreamClaimReply = redis::cmd("XCLAIM")
                .arg(&self.config.stream_name)
                .arg(&self.config.consumer_group)
                .arg(&self.consumer_name)
                .arg(self.visibility_ms())
                .arg(&pending_entry.id)
                .query_async(conn)
                .await?;

            for entry in claimed.ids {
                if times_delivered >= self.config.max_receive_count {
                    self.dead_letter(conn, &entry, times_delivered).await?;
                    continue;
                }

                match self.lease(&entry, times_delivered + 1) {
                    Some(message) => {
                        info!(
                            message_id = %message.message_id,
                            work_item_id = %message.work_item_id,
                            delivery_count = message.delivery_count,
                            "Redelivering message after lease expiry"
                        );
                        messages.push(message);
                    }
                    None => {
                        warn!(message_id = %entry.id, "Dropping malformed stream entry");
                        self.remove(conn, &entry.id).await.ok();
                    }
                }
            }
        }

        Ok(messages)
    }

    async fn read_new(
        &self,
        conn: &mut MultiplexedConnection,
        block: Option<Duration>,
        count: usize,
    ) -> QueueResult<Vec<QueueMessage>> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.consumer_name)
            .arg("COUNT")
            .arg(count);
        if let Some(block) = block {
            cmd.arg("BLOCK").arg(block.as_millis() as u64);
        }
        cmd.arg("STREAMS").arg(&self.config.stream_name).arg(">");

        let reply: Option<StreamReadReply> = cmd.query_async(conn).await?;

        let mut messages = Vec::new();
        for stream_key in reply.map(|r| r.keys).unwrap_or_default() {
            for entry in stream_key.ids {
                match self.lease(&entry, 1) {
                    Some(message) => {
                        debug!(
                            message_id = %message.message_id,
                            work_item_id = %message.work_item_id,
                            "Received message"
                        );
                        messages.push(message);
                    }
                    None => {
                        warn!(message_id = %entry.id, "Dropping malformed stream entry");
                        self.remove(conn, &entry.id).await.ok();
                    }
                }
            }
        }

        Ok(messages)
    }
}

#[async_trait]
impl WorkQueue for RedisWorkQueue {
    async fn send(&self, event: &ObjectWriteEvent) -> QueueResult<String> {
        let work_item_id = event
            .work_item_id()
            .ok_or_else(|| QueueError::invalid_event(&event.key))?;
        let payload = serde_json::to_string(event)?;
        let mut conn = self.connection().await?;

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg(FIELD_EVENT)
            .arg(&payload)
            .arg(FIELD_WORK_ITEM)
            .arg(work_item_id.as_str())
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::enqueue_failed(e.to_string()))?;

        info!(
            message_id = %message_id,
            work_item_id = %work_item_id,
            "Enqueued object-write event"
        );
        Ok(message_id)
    }

    async fn receive(
        &self,
        max_wait: Duration,
        max_messages: usize,
    ) -> QueueResult<Vec<QueueMessage>> {
        if max_messages == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;

        let mut messages = self.reclaim_expired(&mut conn, max_messages).await?;
        let remaining = max_messages.saturating_sub(messages.len());
        if remaining > 0 {
            // Block only when there is nothing to hand back yet. The wait is
            // capped so expired leases are noticed within one visibility window.
            let block = messages
                .is_empty()
                .then(|| max_wait.min(self.config.visibility_timeout))
                .filter(|d| !d.is_zero());
            messages.extend(self.read_new(&mut conn, block, remaining).await?);
        }

        Ok(messages)
    }

    async fn ack(&self, message: &QueueMessage) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        self.remove(&mut conn, &message.message_id).await?;
        debug!(message_id = %message.message_id, "Acknowledged message");
        Ok(())
    }

    async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }

    async fn dead_letter_len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn.xlen(&self.config.dlq_stream_name).await?;
        Ok(len)
    }

    async fn check_connectivity(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }
}

fn value_to_string(value: &redis::Value) -> Option<String> {
    match value {
        redis::Value::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        redis::Value::SimpleString(s) => Some(s.clone()),
        _ => None,
    }
}

fn decode_event(map: &HashMap<String, redis::Value>) -> Option<ObjectWriteEvent> {
    let payload = map.get(FIELD_EVENT).and_then(value_to_string)?;
    serde_json::from_str(&payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_event_fields() {
        let event = ObjectWriteEvent::new("b", "uploads/abc12345.jpg", Some(3));
        let mut map = HashMap::new();
        map.insert(
            FIELD_EVENT.to_string(),
            redis::Value::BulkString(serde_json::to_vec(&event).unwrap()),
        );
        map.insert(
            FIELD_WORK_ITEM.to_string(),
            redis::Value::BulkString(b"abc12345".to_vec()),
        );

        assert_eq!(decode_event(&map), Some(event));
        assert_eq!(
            map.get(FIELD_WORK_ITEM).and_then(value_to_string).as_deref(),
            Some("abc12345")
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let mut map = HashMap::new();
        map.insert(
            FIELD_EVENT.to_string(),
            redis::Value::BulkString(b"{not json".to_vec()),
        );
        assert_eq!(decode_event(&map), None);
        assert_eq!(decode_event(&HashMap::new()), None);
    }
}
