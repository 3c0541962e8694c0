//! Photo classification worker.
//!
//! This crate provides:
//! - The per-message pipeline (fetch, classify, persist)
//! - Acknowledgement handling for terminal and retried messages
//! - A worker pool with bounded concurrency and graceful shutdown

pub mod classifier;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod processor;
pub mod retry;
pub mod settle;

pub use classifier::{
    Classification, Classifier, ClassifierConfig, ClassifierError, ClassifierResult, HttpClassifier,
};
pub use config::WorkerConfig;
pub use error::{FailureClass, WorkerError, WorkerResult};
pub use executor::{ShutdownHandle, WorkerPool};
pub use logging::WorkItemLogger;
pub use processor::{Disposition, MessageProcessor, Outcome, Stage};
pub use retry::{ack_with_retry, AckFailure, AckRetryPolicy, FailureTracker};
pub use settle::{settle, Settlement};
