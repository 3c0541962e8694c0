//! Storage error types.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure storage client: {0}")]
    ConfigError(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Presign failed: {0}")]
    PresignFailed(String),

    #[error("Upload grant expired for {0}")]
    GrantExpired(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("AWS SDK error: {0}")]
    AwsSdk(String),
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::DownloadFailed(msg.into())
    }

    pub fn presign_failed(msg: impl Into<String>) -> Self {
        Self::PresignFailed(msg.into())
    }

    /// Whether a later attempt could succeed.
    ///
    /// A missing object counts: the event can arrive before the write is
    /// visible to readers.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::NotFound(_) | StorageError::DownloadFailed(_) | StorageError::AwsSdk(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(StorageError::not_found("uploads/a.jpg").is_retryable());
        assert!(StorageError::download_failed("reset").is_retryable());
        assert!(!StorageError::presign_failed("bad creds").is_retryable());
        assert!(!StorageError::GrantExpired("uploads/a.jpg".into()).is_retryable());
    }
}
