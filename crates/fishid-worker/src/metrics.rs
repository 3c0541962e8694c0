//! Worker metrics.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Messages finished, by outcome.
    pub const MESSAGES_TOTAL: &str = "fishid_worker_messages_total";

    /// Wall-clock time per message, by outcome.
    pub const MESSAGE_DURATION_SECONDS: &str = "fishid_worker_message_duration_seconds";

    /// Time spent in each processing stage.
    pub const STAGE_DURATION_SECONDS: &str = "fishid_worker_stage_duration_seconds";

    /// Messages abandoned for exceeding the per-message budget.
    pub const TIMEOUTS_TOTAL: &str = "fishid_worker_timeouts_total";

    /// Acknowledgements that failed after retries.
    pub const ACK_FAILURES_TOTAL: &str = "fishid_worker_ack_failures_total";

    /// Messages currently being processed.
    pub const IN_FLIGHT: &str = "fishid_worker_in_flight";

    /// Receive calls that returned an error.
    pub const RECEIVE_ERRORS_TOTAL: &str = "fishid_worker_receive_errors_total";
}

/// Record a finished message. `outcome` is `completed`, `error` or `retry`.
pub fn record_message(outcome: &str, elapsed: Duration) {
    counter!(names::MESSAGES_TOTAL, "outcome" => outcome.to_string()).increment(1);
    histogram!(names::MESSAGE_DURATION_SECONDS, "outcome" => outcome.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_stage(stage: &str, elapsed: Duration) {
    histogram!(names::STAGE_DURATION_SECONDS, "stage" => stage.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_timeout() {
    counter!(names::TIMEOUTS_TOTAL).increment(1);
}

pub fn record_ack_failure() {
    counter!(names::ACK_FAILURES_TOTAL).increment(1);
}

pub fn record_receive_error() {
    counter!(names::RECEIVE_ERRORS_TOTAL).increment(1);
}

pub fn set_in_flight(count: usize) {
    gauge!(names::IN_FLIGHT).set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::MESSAGES_TOTAL.starts_with("fishid_worker_"));
        assert!(names::STAGE_DURATION_SECONDS.contains("stage"));
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_message("completed", Duration::from_millis(5));
        record_stage("fetching", Duration::from_millis(1));
        record_timeout();
        set_in_flight(2);
    }
}
