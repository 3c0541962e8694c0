//! Structured work item logging.

use tracing::{error, info, warn, Span};

use fishid_queue::QueueMessage;

use crate::processor::Stage;

/// Logger carrying the identity of the message being processed.
#[derive(Debug, Clone)]
pub struct WorkItemLogger {
    work_item_id: String,
    message_id: String,
    delivery_count: u32,
}

impl WorkItemLogger {
    pub fn new(message: &QueueMessage) -> Self {
        Self {
            work_item_id: message.work_item_id.to_string(),
            message_id: message.message_id.clone(),
            delivery_count: message.delivery_count,
        }
    }

    pub fn log_start(&self) {
        info!(
            work_item_id = %self.work_item_id,
            message_id = %self.message_id,
            delivery_count = self.delivery_count,
            "Processing started"
        );
    }

    pub fn log_stage(&self, stage: Stage) {
        tracing::debug!(
            work_item_id = %self.work_item_id,
            stage = stage.as_str(),
            "Entering stage"
        );
    }

    pub fn log_retry(&self, stage: Stage, reason: &str) {
        warn!(
            work_item_id = %self.work_item_id,
            message_id = %self.message_id,
            delivery_count = self.delivery_count,
            stage = stage.as_str(),
            "Leaving message for redelivery: {}", reason
        );
    }

    pub fn log_failure(&self, stage: Stage, detail: &str) {
        error!(
            work_item_id = %self.work_item_id,
            message_id = %self.message_id,
            stage = stage.as_str(),
            "Processing failed permanently: {}", detail
        );
    }

    pub fn log_completion(&self, species: &str, confidence: f64) {
        info!(
            work_item_id = %self.work_item_id,
            message_id = %self.message_id,
            species = %species,
            confidence,
            "Processing completed"
        );
    }

    pub fn work_item_id(&self) -> &str {
        &self.work_item_id
    }

    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "work_item",
            work_item_id = %self.work_item_id,
            message_id = %self.message_id,
            delivery_count = self.delivery_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fishid_models::{ObjectWriteEvent, WorkItemId};

    #[test]
    fn test_logger_carries_message_identity() {
        let message = QueueMessage {
            message_id: "1-0".into(),
            work_item_id: WorkItemId::from_string("item-0001"),
            event: ObjectWriteEvent::new("b", "uploads/item-0001.jpg", None),
            lease_token: "t".into(),
            delivery_count: 2,
            visibility_deadline: Utc::now(),
        };
        let logger = WorkItemLogger::new(&message);
        assert_eq!(logger.work_item_id(), "item-0001");
    }
}
