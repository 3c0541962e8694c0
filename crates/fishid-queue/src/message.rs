//! Leased queue messages.

use chrono::{DateTime, Utc};
use fishid_models::{ObjectWriteEvent, WorkItemId};
use serde::{Deserialize, Serialize};

/// A message leased to one consumer.
///
/// `delivery_count` is 1 on first delivery and grows by one each time the
/// lease expires unacknowledged and the message is delivered again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub message_id: String,
    pub work_item_id: WorkItemId,
    pub event: ObjectWriteEvent,
    /// Identifies this particular lease
    pub lease_token: String,
    pub delivery_count: u32,
    /// When the lease lapses and the message becomes receivable again
    pub visibility_deadline: DateTime<Utc>,
}

/// A message that exhausted its deliveries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub original_id: String,
    pub work_item_id: WorkItemId,
    pub event: ObjectWriteEvent,
    pub delivery_count: u32,
    pub dead_lettered_at: DateTime<Utc>,
}
