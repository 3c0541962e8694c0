//! Upload grants against the in-memory store.

use std::sync::Arc;

use chrono::{Duration, Utc};
use fishid_storage::{MemoryObjectStore, ObjectStore, StorageError, UploadCoordinator};

#[tokio::test]
async fn test_upload_within_window_produces_event() {
    let store = Arc::new(MemoryObjectStore::new("fish-uploads"));
    let coordinator = UploadCoordinator::new(store.clone());

    let grant = coordinator.request_upload_grant("catch.png").await.unwrap();
    let event = store.complete_upload(&grant, vec![9; 16]).await.unwrap();

    assert_eq!(event.bucket, "fish-uploads");
    assert_eq!(event.key, grant.object_key);
    assert_eq!(event.size, Some(16));
    assert_eq!(event.work_item_id(), Some(grant.work_item_id.clone()));
    assert_eq!(store.get_object(&grant.object_key).await.unwrap(), vec![9; 16]);
}

#[tokio::test]
async fn test_expired_grant_rejects_write() {
    let store = Arc::new(MemoryObjectStore::new("fish-uploads"));
    let coordinator = UploadCoordinator::new(store.clone());

    let grant = coordinator.request_upload_grant("late.jpg").await.unwrap();
    let too_late = Utc::now() + Duration::seconds(301);
    let err = store
        .complete_upload_at(&grant, vec![1, 2, 3], too_late)
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::GrantExpired(_)));
    assert!(!store.contains(&grant.object_key).await);
}

#[tokio::test]
async fn test_grant_is_single_use() {
    let store = Arc::new(MemoryObjectStore::new("fish-uploads"));
    let coordinator = UploadCoordinator::new(store.clone());

    let grant = coordinator.request_upload_grant("once.jpg").await.unwrap();
    store.complete_upload(&grant, vec![1]).await.unwrap();
    assert!(store.complete_upload(&grant, vec![2]).await.is_err());
    assert_eq!(store.get_object(&grant.object_key).await.unwrap(), vec![1]);
}
