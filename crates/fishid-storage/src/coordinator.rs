//! Upload grant issuance.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fishid_models::{infer_extension, UploadGrant, WorkItem};
use tracing::{info, warn};

use crate::error::{StorageError, StorageResult};
use crate::store::{content_type_for, ObjectStore};

/// Validity window for upload grants.
pub const UPLOAD_GRANT_TTL: Duration = Duration::from_secs(300);

/// Issues time-limited, single-object write grants.
///
/// No state is recorded beyond the work item id embedded in the object key;
/// the work item becomes visible to the pipeline only once storage reports
/// the write.
#[derive(Clone)]
pub struct UploadCoordinator {
    store: Arc<dyn ObjectStore>,
}

impl UploadCoordinator {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Create a work item and presign a write for it.
    ///
    /// `filename` only contributes the object extension. Presign failures are
    /// returned as is.
    pub async fn request_upload_grant(&self, filename: &str) -> StorageResult<UploadGrant> {
        let item = WorkItem::new();
        let extension = infer_extension(filename);
        let object_key = item.id.object_key(&extension);
        let content_type = content_type_for(&extension);

        let presigned = self
            .store
            .presign_put(&object_key, content_type, UPLOAD_GRANT_TTL)
            .await
            .map_err(|e| {
                warn!(work_item_id = %item.id, error = %e, "Failed to presign upload");
                e
            })?;

        let ttl = chrono::Duration::from_std(UPLOAD_GRANT_TTL)
            .map_err(|e| StorageError::presign_failed(e.to_string()))?;

        info!(
            work_item_id = %item.id,
            object_key = %object_key,
            "Issued upload grant"
        );

        Ok(UploadGrant {
            work_item_id: item.id,
            object_key,
            write_endpoint: presigned.url,
            method: presigned.method,
            credential_fields: presigned.headers,
            expires_in_secs: UPLOAD_GRANT_TTL.as_secs(),
            expires_at: Utc::now() + ttl,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryObjectStore;
    use async_trait::async_trait;

    use crate::store::PresignedWrite;

    struct BrokenStore;

    #[async_trait]
    impl ObjectStore for BrokenStore {
        fn bucket(&self) -> &str {
            "broken"
        }

        async fn presign_put(&self, _: &str, _: &str, _: Duration) -> StorageResult<PresignedWrite> {
            Err(StorageError::presign_failed("no credentials"))
        }

        async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>> {
            Err(StorageError::not_found(key))
        }

        async fn check_connectivity(&self) -> StorageResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_grant_for_jpeg() {
        let coordinator = UploadCoordinator::new(Arc::new(MemoryObjectStore::new("fish")));
        let grant = coordinator.request_upload_grant("fish1.jpg").await.unwrap();

        assert_eq!(grant.expires_in_secs, 300);
        assert_eq!(grant.method, "PUT");
        assert_eq!(grant.object_key, format!("uploads/{}.jpg", grant.work_item_id));
        assert_eq!(
            grant.credential_fields.get("Content-Type").map(String::as_str),
            Some("image/jpeg")
        );
        let remaining = grant.expires_at - Utc::now();
        assert!(remaining.num_seconds() > 290 && remaining.num_seconds() <= 300);
    }

    #[tokio::test]
    async fn test_each_grant_gets_a_fresh_id() {
        let coordinator = UploadCoordinator::new(Arc::new(MemoryObjectStore::new("fish")));
        let a = coordinator.request_upload_grant("a.png").await.unwrap();
        let b = coordinator.request_upload_grant("a.png").await.unwrap();
        assert_ne!(a.work_item_id, b.work_item_id);
        assert_ne!(a.write_endpoint, b.write_endpoint);
    }

    #[tokio::test]
    async fn test_presign_failure_propagates() {
        let coordinator = UploadCoordinator::new(Arc::new(BrokenStore));
        let err = coordinator.request_upload_grant("a.jpg").await.unwrap_err();
        assert!(matches!(err, StorageError::PresignFailed(_)));
    }
}
