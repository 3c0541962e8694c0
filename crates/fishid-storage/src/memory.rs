//! In-memory object store.
//!
//! Simulates presigned writes so that the full upload path, including grant
//! expiry, can be exercised without a storage service.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fishid_models::{ObjectWriteEvent, UploadGrant};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::store::{ObjectStore, PresignedWrite};

#[derive(Debug, Clone)]
struct PendingWrite {
    key: String,
    content_type: String,
    expires_at: DateTime<Utc>,
}

/// Object store holding everything in process memory.
#[derive(Debug)]
pub struct MemoryObjectStore {
    bucket: String,
    objects: Mutex<HashMap<String, Vec<u8>>>,
    pending_writes: Mutex<HashMap<String, PendingWrite>>,
    failing_gets: AtomicU32,
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Mutex::new(HashMap::new()),
            pending_writes: Mutex::new(HashMap::new()),
            failing_gets: AtomicU32::new(0),
        }
    }

    /// Store an object directly, bypassing grants.
    pub async fn put_object(&self, key: impl Into<String>, bytes: Vec<u8>) {
        self.objects.lock().await.insert(key.into(), bytes);
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.lock().await.contains_key(key)
    }

    /// Make the next `count` reads fail with a transient error.
    pub fn fail_next_gets(&self, count: u32) {
        self.failing_gets.store(count, Ordering::SeqCst);
    }

    /// Perform the client's write against a grant, as of now.
    pub async fn complete_upload(
        &self,
        grant: &UploadGrant,
        bytes: Vec<u8>,
    ) -> StorageResult<ObjectWriteEvent> {
        self.complete_upload_at(grant, bytes, Utc::now()).await
    }

    /// Perform the client's write against a grant at `now`.
    ///
    /// An expired or unknown endpoint rejects the write and no event is
    /// produced.
    pub async fn complete_upload_at(
        &self,
        grant: &UploadGrant,
        bytes: Vec<u8>,
        now: DateTime<Utc>,
    ) -> StorageResult<ObjectWriteEvent> {
        let pending = {
            let mut writes = self.pending_writes.lock().await;
            let pending = writes
                .get(&grant.write_endpoint)
                .cloned()
                .ok_or_else(|| StorageError::InvalidKey(grant.object_key.clone()))?;
            if now >= pending.expires_at {
                return Err(StorageError::GrantExpired(pending.key));
            }
            if grant.credential_fields.get("Content-Type") != Some(&pending.content_type) {
                return Err(StorageError::UploadFailed("signature mismatch".to_string()));
            }
            writes.remove(&grant.write_endpoint);
            pending
        };

        let size = bytes.len() as u64;
        self.put_object(pending.key.clone(), bytes).await;
        debug!(key = %pending.key, size, "Simulated upload completed");

        Ok(ObjectWriteEvent::new(&self.bucket, pending.key, Some(size)))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn presign_put(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> StorageResult<PresignedWrite> {
        let ttl = chrono::Duration::from_std(expires_in)
            .map_err(|e| StorageError::presign_failed(e.to_string()))?;
        let url = format!("memory://{}/{}?signature={}", self.bucket, key, Uuid::new_v4());

        self.pending_writes.lock().await.insert(
            url.clone(),
            PendingWrite {
                key: key.to_string(),
                content_type: content_type.to_string(),
                expires_at: Utc::now() + ttl,
            },
        );

        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), content_type.to_string());

        Ok(PresignedWrite {
            url,
            method: "PUT".to_string(),
            headers,
        })
    }

    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>> {
        let failing = self
            .failing_gets
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(StorageError::download_failed("simulated transient failure"));
        }

        self.objects
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::not_found(key))
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_missing_object() {
        let store = MemoryObjectStore::new("bucket");
        let err = store.get_object("uploads/missing.jpg").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = MemoryObjectStore::new("bucket");
        store.put_object("k", vec![1, 2, 3]).await;
        store.fail_next_gets(1);
        assert!(store.get_object("k").await.unwrap_err().is_retryable());
        assert_eq!(store.get_object("k").await.unwrap(), vec![1, 2, 3]);
    }
}
