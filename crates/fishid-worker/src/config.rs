//! Worker configuration.

use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum messages processed at once
    pub max_concurrent_jobs: usize,
    /// Upper bound on messages requested per receive
    pub max_batch: usize,
    /// Hard wall-clock budget per message
    pub job_timeout: Duration,
    /// How long to wait for in-flight messages on shutdown
    pub shutdown_timeout: Duration,
    /// Long-poll wait per receive
    pub receive_wait: Duration,
    /// Pause after a failed receive
    pub error_backoff: Duration,
    /// Address for the Prometheus exporter, if any
    pub metrics_addr: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            max_batch: 10,
            job_timeout: Duration::from_secs(45),
            shutdown_timeout: Duration::from_secs(30),
            receive_wait: Duration::from_secs(20),
            error_backoff: Duration::from_secs(5),
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(4),
            max_batch: std::env::var("WORKER_MAX_BATCH")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(10),
            job_timeout: Duration::from_secs(
                std::env::var("WORKER_JOB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(45),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            receive_wait: Duration::from_secs(
                std::env::var("QUEUE_RECEIVE_WAIT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(20),
            ),
            error_backoff: Duration::from_secs(
                std::env::var("WORKER_ERROR_BACKOFF_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            metrics_addr: std::env::var("WORKER_METRICS_ADDR").ok().filter(|s| !s.is_empty()),
        }
    }

    /// Whether a message can finish before its lease expires.
    pub fn fits_visibility(&self, visibility_timeout: Duration) -> bool {
        self.job_timeout < visibility_timeout
    }
}
