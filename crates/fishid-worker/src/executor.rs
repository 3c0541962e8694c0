//! Worker pool.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use fishid_queue::{QueueMessage, WorkQueue};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::processor::MessageProcessor;
use crate::retry::{AckRetryPolicy, FailureTracker};
use crate::settle::{settle, Settlement};

/// Receive errors logged in a row before further ones are suppressed.
const MAX_LOGGED_RECEIVE_FAILURES: u32 = 5;

/// Everything a spawned message task needs.
struct TaskContext {
    queue: Arc<dyn WorkQueue>,
    processor: Arc<MessageProcessor>,
    ack_retry: AckRetryPolicy,
    job_timeout: Duration,
}

/// Pulls messages from the queue and processes them with bounded concurrency.
pub struct WorkerPool {
    config: WorkerConfig,
    ctx: Arc<TaskContext>,
    job_semaphore: Arc<Semaphore>,
    shutdown: Arc<watch::Sender<bool>>,
    pool_name: String,
}

impl WorkerPool {
    pub fn new(
        config: WorkerConfig,
        queue: Arc<dyn WorkQueue>,
        processor: Arc<MessageProcessor>,
    ) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let ctx = Arc::new(TaskContext {
            queue,
            processor,
            ack_retry: AckRetryPolicy::default(),
            job_timeout: config.job_timeout,
        });

        Self {
            config,
            ctx,
            job_semaphore,
            shutdown: Arc::new(shutdown),
            pool_name: format!("worker-{}", Uuid::new_v4()),
        }
    }

    /// Run until [`WorkerPool::shutdown`] is called, then drain in-flight work.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting worker pool '{}' with {} max concurrent jobs",
            self.pool_name, self.config.max_concurrent_jobs
        );

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut failures = FailureTracker::new(MAX_LOGGED_RECEIVE_FAILURES);

        loop {
            if *shutdown_rx.borrow_and_update() {
                info!("Shutdown signal received, stopping worker pool");
                break;
            }

            tokio::select! {
                _ = shutdown_rx.changed() => {}
                result = self.consume_once() => match result {
                    Ok(_) => failures.record_success(),
                    Err(e) => {
                        metrics::record_receive_error();
                        if failures.record_failure() {
                            error!("Error receiving messages: {}", e);
                        }
                        tokio::time::sleep(self.config.error_backoff).await;
                    }
                }
            }
        }

        info!("Waiting for in-flight messages to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                in_flight = self.in_flight(),
                "Shutdown timeout reached, abandoning in-flight messages to lease expiry"
            );
        }

        info!("Worker pool stopped");
        Ok(())
    }

    /// Receive one batch and spawn a task per message.
    ///
    /// Returns the number of messages started.
    pub async fn consume_once(&self) -> WorkerResult<usize> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(0);
        }

        let messages = self
            .ctx
            .queue
            .receive(self.config.receive_wait, available.min(self.config.max_batch))
            .await?;

        if messages.is_empty() {
            return Ok(0);
        }
        debug!("Received {} messages from queue", messages.len());

        let count = messages.len();
        for message in messages {
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::config_error("Worker semaphore closed"))?;
            let ctx = Arc::clone(&self.ctx);
            let semaphore = Arc::clone(&self.job_semaphore);
            let max = self.config.max_concurrent_jobs;

            metrics::set_in_flight(max - semaphore.available_permits());
            tokio::spawn(async move {
                Self::execute(&ctx, message).await;
                drop(permit);
                metrics::set_in_flight(max - semaphore.available_permits());
            });
        }

        Ok(count)
    }

    /// Process one message under the per-message budget, then settle it.
    ///
    /// A message that overruns the budget is dropped unacknowledged and
    /// comes back once its lease expires.
    async fn execute(ctx: &TaskContext, message: QueueMessage) -> Option<Settlement> {
        let started = Instant::now();

        match tokio::time::timeout(ctx.job_timeout, ctx.processor.process(&message)).await {
            Ok(disposition) => {
                let settlement =
                    settle(ctx.queue.as_ref(), &message, &disposition, &ctx.ack_retry).await;
                metrics::record_message(disposition.label(), started.elapsed());
                Some(settlement)
            }
            Err(_) => {
                metrics::record_timeout();
                metrics::record_message("timeout", started.elapsed());
                warn!(
                    message_id = %message.message_id,
                    work_item_id = %message.work_item_id,
                    delivery_count = message.delivery_count,
                    "{}",
                    WorkerError::Timeout(ctx.job_timeout)
                );
                None
            }
        }
    }

    /// Messages currently being processed.
    pub fn in_flight(&self) -> usize {
        self.config.max_concurrent_jobs - self.job_semaphore.available_permits()
    }

    /// Wait for all in-flight messages to complete.
    async fn wait_for_jobs(&self) {
        loop {
            let available = self.job_semaphore.available_permits();
            if available == self.config.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Handle that can signal shutdown from another task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            sender: Arc::clone(&self.shutdown),
        }
    }
}

/// Cloneable shutdown trigger for a [`WorkerPool`].
#[derive(Clone)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.sender.send_replace(true);
    }
}
