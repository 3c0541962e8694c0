//! Applies a disposition to the queue.

use std::time::Instant;

use fishid_queue::{QueueMessage, WorkQueue};
use tracing::{debug, error};

use crate::metrics;
use crate::processor::{Disposition, Stage};
use crate::retry::{ack_with_retry, AckFailure, AckRetryPolicy};

/// What `settle` did with the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The message was acknowledged and will not be delivered again
    Acked,
    /// The acknowledgement was withheld; the lease will expire
    Withheld,
    /// Acknowledging failed; the message will be redelivered and the
    /// stored terminal result overwritten idempotently
    AckFailed,
}

/// Acknowledge terminal dispositions and withhold the ack on retries.
pub async fn settle(
    queue: &dyn WorkQueue,
    message: &QueueMessage,
    disposition: &Disposition,
    retry: &AckRetryPolicy,
) -> Settlement {
    match disposition {
        Disposition::Retry { reason } => {
            debug!(
                message_id = %message.message_id,
                delivery_count = message.delivery_count,
                reason = %reason,
                "Withholding ack"
            );
            Settlement::Withheld
        }
        Disposition::Terminal(_) => {
            let started = Instant::now();
            let acked = ack_with_retry(queue, message, retry).await;
            metrics::record_stage(Stage::Acking.as_str(), started.elapsed());
            settle_ack(message, acked)
        }
    }
}

fn settle_ack(message: &QueueMessage, acked: Result<(), AckFailure>) -> Settlement {
    match acked {
        Ok(()) => Settlement::Acked,
        Err(AckFailure { error, attempts }) => {
            metrics::record_ack_failure();
            error!(
                message_id = %message.message_id,
                work_item_id = %message.work_item_id,
                attempts,
                "Failed to ack message: {}", error
            );
            Settlement::AckFailed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use fishid_models::{ObjectWriteEvent, WorkItemId};
    use fishid_queue::{QueueError, QueueResult};

    use crate::processor::Outcome;

    #[derive(Default)]
    struct RecordingQueue {
        acks: AtomicU32,
        attempts: AtomicU32,
        failures_left: AtomicU32,
        rejects: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl WorkQueue for RecordingQueue {
        async fn send(&self, _: &ObjectWriteEvent) -> QueueResult<String> {
            Ok("1".into())
        }

        async fn receive(&self, _: Duration, _: usize) -> QueueResult<Vec<QueueMessage>> {
            Ok(Vec::new())
        }

        async fn ack(&self, _: &QueueMessage) -> QueueResult<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.rejects.load(Ordering::SeqCst) {
                return Err(QueueError::invalid_event("uploads/item-0001.jpg"));
            }
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(QueueError::connection_failed("reset"));
            }
            self.acks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn len(&self) -> QueueResult<u64> {
            Ok(0)
        }

        async fn dead_letter_len(&self) -> QueueResult<u64> {
            Ok(0)
        }

        async fn check_connectivity(&self) -> QueueResult<()> {
            Ok(())
        }
    }

    fn message() -> QueueMessage {
        QueueMessage {
            message_id: "1-0".into(),
            work_item_id: WorkItemId::from_string("item-0001"),
            event: ObjectWriteEvent::new("b", "uploads/item-0001.jpg", None),
            lease_token: "t".into(),
            delivery_count: 1,
            visibility_deadline: Utc::now(),
        }
    }

    fn terminal() -> Disposition {
        Disposition::Terminal(Outcome::Error {
            detail: "bad image".into(),
        })
    }

    #[tokio::test]
    async fn test_retry_withholds_ack() {
        let queue = RecordingQueue::default();
        let settlement = settle(
            &queue,
            &message(),
            &Disposition::retry("storage down"),
            &AckRetryPolicy::default(),
        )
        .await;
        assert_eq!(settlement, Settlement::Withheld);
        assert_eq!(queue.acks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_terminal_acks() {
        let queue = RecordingQueue::default();
        let settlement = settle(&queue, &message(), &terminal(), &AckRetryPolicy::default()).await;
        assert_eq!(settlement, Settlement::Acked);
        assert_eq!(queue.acks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_retried_then_given_up() {
        let queue = RecordingQueue::default();
        queue.failures_left.store(1, Ordering::SeqCst);
        let retry = AckRetryPolicy {
            max_retries: 2,
            ..AckRetryPolicy::default()
        };
        assert_eq!(settle(&queue, &message(), &terminal(), &retry).await, Settlement::Acked);

        queue.failures_left.store(10, Ordering::SeqCst);
        assert_eq!(
            settle(&queue, &message(), &terminal(), &retry).await,
            Settlement::AckFailed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_ack_error_is_not_retried() {
        let queue = RecordingQueue::default();
        queue.rejects.store(true, Ordering::SeqCst);

        let settlement = settle(&queue, &message(), &terminal(), &AckRetryPolicy::default()).await;

        assert_eq!(settlement, Settlement::AckFailed);
        assert_eq!(queue.attempts.load(Ordering::SeqCst), 1);
    }
}
