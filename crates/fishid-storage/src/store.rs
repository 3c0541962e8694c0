//! Object store abstraction.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::StorageResult;

/// A presigned write request the client performs directly against storage.
#[derive(Debug, Clone, PartialEq)]
pub struct PresignedWrite {
    pub url: String,
    pub method: String,
    /// Headers that must accompany the write for the signature to hold
    pub headers: BTreeMap<String, String>,
}

/// Object storage used by the pipeline.
///
/// Objects are immutable once written; the pipeline only reads them.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket the store writes to.
    fn bucket(&self) -> &str;

    /// Presign a single-object write valid for `expires_in`.
    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> StorageResult<PresignedWrite>;

    /// Fetch an object's bytes.
    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Cheap reachability check used by the readiness endpoint.
    async fn check_connectivity(&self) -> StorageResult<()>;
}

/// MIME type for an upload extension.
pub fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_types() {
        assert_eq!(content_type_for("jpg"), "image/jpeg");
        assert_eq!(content_type_for("png"), "image/png");
        assert_eq!(content_type_for("xyz"), "application/octet-stream");
    }
}
