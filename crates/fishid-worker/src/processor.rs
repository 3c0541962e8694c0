//! Per-message processing.
//!
//! A message moves through `Received -> Fetching -> Inferring -> Persisting`
//! and ends in a [`Disposition`]. Acknowledging is left to [`crate::settle`],
//! so this module never touches the queue.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::{debug, warn, Instrument};

use fishid_models::{IdentificationPayload, ResultRecord, ResultStatus, SpeciesCatalog};
use fishid_queue::{Notification, Notifier, QueueMessage};
use fishid_results::{ResultStore, WriteOutcome};
use fishid_storage::ObjectStore;

use crate::classifier::{Classification, Classifier};
use crate::error::{FailureClass, WorkerError, WorkerResult};
use crate::logging::WorkItemLogger;
use crate::metrics;

/// Processing stage of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Fetching,
    Inferring,
    Persisting,
    Acking,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Fetching => "fetching",
            Stage::Inferring => "inferring",
            Stage::Persisting => "persisting",
            Stage::Acking => "acking",
        }
    }
}

/// Final outcome recorded for a work item.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed { payload: IdentificationPayload },
    Error { detail: String },
}

/// What should happen to the message after processing.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Withhold the acknowledgement; the queue redelivers after the lease.
    Retry { reason: String },
    /// A terminal result is stored; acknowledge.
    Terminal(Outcome),
}

impl Disposition {
    pub fn retry(reason: impl Into<String>) -> Self {
        Self::Retry {
            reason: reason.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Disposition::Terminal(_))
    }

    /// Label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Disposition::Retry { .. } => "retry",
            Disposition::Terminal(Outcome::Completed { .. }) => "completed",
            Disposition::Terminal(Outcome::Error { .. }) => "error",
        }
    }
}

/// Runs the pipeline for one message against the configured collaborators.
pub struct MessageProcessor {
    objects: Arc<dyn ObjectStore>,
    results: Arc<dyn ResultStore>,
    classifier: Arc<dyn Classifier>,
    catalog: Arc<SpeciesCatalog>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl MessageProcessor {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        results: Arc<dyn ResultStore>,
        classifier: Arc<dyn Classifier>,
        catalog: Arc<SpeciesCatalog>,
    ) -> Self {
        Self {
            objects,
            results,
            classifier,
            catalog,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Process one leased message.
    ///
    /// Safe to run more than once for the same work item, including
    /// concurrently: every write is a full overwrite and the store refuses
    /// to move a status backward.
    pub async fn process(&self, message: &QueueMessage) -> Disposition {
        let logger = WorkItemLogger::new(message);
        let span = logger.create_span();
        self.process_inner(message, &logger).instrument(span).await
    }

    async fn process_inner(&self, message: &QueueMessage, logger: &WorkItemLogger) -> Disposition {
        logger.log_start();

        logger.log_stage(Stage::Fetching);
        let started = Instant::now();
        let fetched = self.objects.get_object(&message.event.key).await;
        metrics::record_stage(Stage::Fetching.as_str(), started.elapsed());
        let bytes = match fetched {
            Ok(bytes) => bytes,
            Err(e) => return self.fail(message, logger, Stage::Fetching, e.into()).await,
        };

        match self
            .results
            .put_result(&ResultRecord::processing(message.work_item_id.clone()))
            .await
        {
            Ok(WriteOutcome::Applied) => {}
            Ok(WriteOutcome::Superseded) => {
                if let Some(disposition) = self.existing_terminal(message).await {
                    debug!(
                        work_item_id = %message.work_item_id,
                        "Result already terminal, skipping inference"
                    );
                    return disposition;
                }
            }
            Err(e) => return self.fail(message, logger, Stage::Persisting, e.into()).await,
        }

        logger.log_stage(Stage::Inferring);
        let started = Instant::now();
        let inferred = self.infer(bytes).await;
        metrics::record_stage(Stage::Inferring.as_str(), started.elapsed());
        let classification = match inferred {
            Ok(classification) => classification,
            Err(e) => return self.fail(message, logger, Stage::Inferring, e).await,
        };

        let payload = IdentificationPayload::from_classification(
            classification.label,
            classification.confidence,
            &self.catalog,
        );
        if let Err(e) = payload.validate() {
            return self.fail(message, logger, Stage::Inferring, e.into()).await;
        }

        logger.log_stage(Stage::Persisting);
        let started = Instant::now();
        let record = ResultRecord::completed(message.work_item_id.clone(), payload.clone());
        let persisted = self.results.put_result(&record).await;
        metrics::record_stage(Stage::Persisting.as_str(), started.elapsed());
        match persisted {
            Ok(WriteOutcome::Applied) => {}
            Ok(WriteOutcome::Superseded) => {
                // A concurrent lease already recorded a terminal error.
                return self
                    .existing_terminal(message)
                    .await
                    .unwrap_or_else(|| Disposition::retry("result write superseded"));
            }
            Err(e) => return self.fail(message, logger, Stage::Persisting, e.into()).await,
        }

        logger.log_completion(&payload.species, payload.confidence);
        self.notify_completed(message, &payload).await;

        Disposition::Terminal(Outcome::Completed { payload })
    }

    /// Decode the image, then classify it.
    ///
    /// Decoding runs on the blocking pool; a classifier panic is caught and
    /// reported as a failure of this message only.
    async fn infer(&self, bytes: Vec<u8>) -> WorkerResult<Classification> {
        let bytes = Arc::new(bytes);

        let decode_input = Arc::clone(&bytes);
        tokio::task::spawn_blocking(move || {
            image::load_from_memory(&decode_input).map(|img| (img.width(), img.height()))
        })
        .await
        .map_err(|e| WorkerError::decode(format!("decoder panicked: {e}")))?
        .map_err(|e| WorkerError::decode(e.to_string()))?;

        let classified = AssertUnwindSafe(self.classifier.classify(&bytes))
            .catch_unwind()
            .await
            .map_err(|panic| WorkerError::ClassifierPanicked(panic_message(panic.as_ref())))?;

        Ok(classified?)
    }

    /// Turn a failure into a disposition.
    ///
    /// Transient failures leave the message for redelivery. Permanent ones
    /// record an `error` result first; if even that write fails the message
    /// is retried. Only completions are announced to subscribers.
    async fn fail(
        &self,
        message: &QueueMessage,
        logger: &WorkItemLogger,
        stage: Stage,
        error: WorkerError,
    ) -> Disposition {
        let detail = error.to_string();

        if error.failure_class() == FailureClass::Transient {
            logger.log_retry(stage, &detail);
            return Disposition::retry(detail);
        }

        logger.log_failure(stage, &detail);
        let record = ResultRecord::error(message.work_item_id.clone(), detail.clone());
        match self.results.put_result(&record).await {
            Ok(WriteOutcome::Applied) => Disposition::Terminal(Outcome::Error { detail }),
            Ok(WriteOutcome::Superseded) => self
                .existing_terminal(message)
                .await
                .unwrap_or_else(|| Disposition::retry("error write superseded")),
            Err(e) => {
                logger.log_retry(Stage::Persisting, &e.to_string());
                Disposition::retry(format!("failed to record error: {}", e))
            }
        }
    }

    /// Disposition matching a terminal record already in the store.
    async fn existing_terminal(&self, message: &QueueMessage) -> Option<Disposition> {
        let record = match self.results.get_status(&message.work_item_id).await {
            Ok(record) => record?,
            Err(e) => {
                warn!(work_item_id = %message.work_item_id, error = %e, "Failed to read result");
                return None;
            }
        };

        match record.status {
            ResultStatus::Completed => record
                .payload
                .map(|payload| Disposition::Terminal(Outcome::Completed { payload })),
            ResultStatus::Error => Some(Disposition::Terminal(Outcome::Error {
                detail: record.error_detail.unwrap_or_default(),
            })),
            ResultStatus::Pending | ResultStatus::Processing => None,
        }
    }

    /// Best-effort announcement of a completed identification.
    async fn notify_completed(&self, message: &QueueMessage, payload: &IdentificationPayload) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let notification = Notification::new(
            message.work_item_id.clone(),
            ResultStatus::Completed,
            payload.summary_subject(),
            payload.summary_text(),
        );
        if let Err(e) = notifier.publish(&notification).await {
            warn!(
                work_item_id = %message.work_item_id,
                error = %e,
                "Failed to publish notification"
            );
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
