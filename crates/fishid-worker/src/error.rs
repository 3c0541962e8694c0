//! Worker error types.

use std::time::Duration;

use thiserror::Error;

use crate::classifier::ClassifierError;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// How a failure affects the message that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Leave the message unacknowledged so the queue redelivers it
    Transient,
    /// Record an `error` result and acknowledge
    Permanent,
}

impl FailureClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::Transient => "transient",
            FailureClass::Permanent => "permanent",
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] fishid_storage::StorageError),

    #[error("Image could not be decoded: {0}")]
    Decode(String),

    #[error("Classification failed: {0}")]
    Classification(#[from] ClassifierError),

    #[error("Classifier panicked: {0}")]
    ClassifierPanicked(String),

    #[error("Invalid identification: {0}")]
    InvalidPayload(#[from] fishid_models::PayloadError),

    #[error("Result store error: {0}")]
    Persist(#[from] fishid_results::ResultStoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] fishid_queue::QueueError),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Classify the failure for the disposition of the current message.
    ///
    /// Anything not recognised as transient infrastructure trouble is
    /// permanent.
    pub fn failure_class(&self) -> FailureClass {
        match self {
            WorkerError::Fetch(e) if e.is_retryable() => FailureClass::Transient,
            WorkerError::Persist(_) | WorkerError::Queue(_) | WorkerError::Timeout(_) => {
                FailureClass::Transient
            }
            WorkerError::Io(e) if is_transient_io(e) => FailureClass::Transient,
            _ => FailureClass::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.failure_class() == FailureClass::Transient
    }
}

fn is_transient_io(e: &std::io::Error) -> bool {
    use std::io::ErrorKind::*;
    matches!(
        e.kind(),
        ConnectionRefused
            | ConnectionReset
            | ConnectionAborted
            | NotConnected
            | BrokenPipe
            | TimedOut
            | Interrupted
            | WouldBlock
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use fishid_storage::StorageError;

    #[test]
    fn test_failure_classes() {
        assert_eq!(
            WorkerError::from(StorageError::not_found("k")).failure_class(),
            FailureClass::Transient
        );
        assert_eq!(
            WorkerError::from(StorageError::config_error("bad")).failure_class(),
            FailureClass::Permanent
        );
        assert_eq!(WorkerError::decode("garbage").failure_class(), FailureClass::Permanent);
        assert_eq!(
            WorkerError::ClassifierPanicked("boom".into()).failure_class(),
            FailureClass::Permanent
        );
        assert_eq!(
            WorkerError::from(fishid_results::ResultStoreError::unavailable("down")).failure_class(),
            FailureClass::Transient
        );
        assert_eq!(
            WorkerError::Io(std::io::Error::from(std::io::ErrorKind::ConnectionReset)).failure_class(),
            FailureClass::Transient
        );
        assert_eq!(
            WorkerError::Io(std::io::Error::from(std::io::ErrorKind::InvalidData)).failure_class(),
            FailureClass::Permanent
        );
    }
}
