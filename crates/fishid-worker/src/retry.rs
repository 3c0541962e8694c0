//! Acknowledgement retries and receive-error log throttling.

use std::time::Duration;

use tracing::{debug, info, warn};

use fishid_queue::{QueueError, QueueMessage, WorkQueue};

/// Backoff for re-sending a failed acknowledgement.
#[derive(Debug, Clone)]
pub struct AckRetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for AckRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl AckRetryPolicy {
    /// Delay before retry number `retry` (1-based), doubling up to the cap.
    fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// An acknowledgement that could not be delivered.
#[derive(Debug)]
pub struct AckFailure {
    pub error: QueueError,
    pub attempts: u32,
}

/// Acknowledge `message`, retrying only errors the queue reports as transient.
pub async fn ack_with_retry(
    queue: &dyn WorkQueue,
    message: &QueueMessage,
    policy: &AckRetryPolicy,
) -> Result<(), AckFailure> {
    let mut retries = 0u32;

    loop {
        match queue.ack(message).await {
            Ok(()) => return Ok(()),
            Err(error) if error.is_retryable() && retries < policy.max_retries => {
                retries += 1;
                let delay = policy.backoff(retries);
                debug!(
                    message_id = %message.message_id,
                    retry = retries,
                    delay_ms = delay.as_millis() as u64,
                    "Ack failed, retrying: {}", error
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => {
                return Err(AckFailure {
                    error,
                    attempts: retries + 1,
                })
            }
        }
    }
}

/// Logs the first few failures of a streak, then stays quiet until a success.
#[derive(Debug)]
pub struct FailureTracker {
    streak: u32,
    logged_limit: u32,
}

impl FailureTracker {
    pub fn new(logged_limit: u32) -> Self {
        Self {
            streak: 0,
            logged_limit,
        }
    }

    pub fn record_success(&mut self) {
        if self.streak > self.logged_limit {
            info!(failures = self.streak, "Recovered after repeated failures");
        }
        self.streak = 0;
    }

    /// Returns `true` while this failure should still be logged.
    pub fn record_failure(&mut self) -> bool {
        self.streak = self.streak.saturating_add(1);
        if self.streak == self.logged_limit + 1 {
            warn!(
                "Suppressing further failure logs after {} in a row",
                self.logged_limit
            );
        }
        self.streak <= self.logged_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = AckRetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(40), Duration::from_secs(2));
    }

    #[test]
    fn test_failure_tracker_throttles_streak() {
        let mut tracker = FailureTracker::new(2);
        assert!(tracker.record_failure());
        assert!(tracker.record_failure());
        assert!(!tracker.record_failure());
        assert!(!tracker.record_failure());
        tracker.record_success();
        assert!(tracker.record_failure());
    }
}
