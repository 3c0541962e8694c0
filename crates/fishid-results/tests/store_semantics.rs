//! Result store behaviour shared by every implementation.

use fishid_models::{IdentificationPayload, ResultRecord, ResultStatus, SpeciesCatalog, WorkItemId};
use fishid_results::{
    MemoryResultStore, RedisResultStore, ResultStore, ResultStoreConfig, WriteOutcome,
};

fn payload(species: &str, confidence: f64) -> IdentificationPayload {
    let catalog = SpeciesCatalog::embedded().unwrap();
    IdentificationPayload::from_classification(species, confidence, &catalog)
}

async fn check_missing_is_none(store: &dyn ResultStore) {
    assert!(store.get_status(&WorkItemId::new()).await.unwrap().is_none());
}

async fn check_completed_overwrite_is_idempotent(store: &dyn ResultStore) {
    let id = WorkItemId::new();
    let record = ResultRecord::completed(id.clone(), payload("Sparus aurata", 0.91));

    assert_eq!(store.put_result(&record).await.unwrap(), WriteOutcome::Applied);
    let first = store.get_status(&id).await.unwrap().unwrap();
    assert_eq!(store.put_result(&record).await.unwrap(), WriteOutcome::Applied);
    let second = store.get_status(&id).await.unwrap().unwrap();

    assert_eq!(first, second);
    assert_eq!(second.status, ResultStatus::Completed);
}

async fn check_status_is_monotone(store: &dyn ResultStore) {
    let id = WorkItemId::new();

    store.put_result(&ResultRecord::processing(id.clone())).await.unwrap();
    let completed = ResultRecord::completed(id.clone(), payload("Mugil cephalus", 0.8));
    assert!(store.put_result(&completed).await.unwrap().is_applied());

    // A late lease writing `processing` or a conflicting terminal loses.
    assert_eq!(
        store.put_result(&ResultRecord::processing(id.clone())).await.unwrap(),
        WriteOutcome::Superseded
    );
    assert_eq!(
        store.put_result(&ResultRecord::error(id.clone(), "late failure")).await.unwrap(),
        WriteOutcome::Superseded
    );
    assert_eq!(
        store.put_result(&ResultRecord::pending(id.clone())).await.unwrap(),
        WriteOutcome::Superseded
    );

    let stored = store.get_status(&id).await.unwrap().unwrap();
    assert_eq!(stored, completed);
}

async fn check_error_record_round_trips(store: &dyn ResultStore) {
    let id = WorkItemId::new();
    let record = ResultRecord::error(id.clone(), "image could not be decoded");
    store.put_result(&record).await.unwrap();

    let stored = store.get_status(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, ResultStatus::Error);
    assert_eq!(stored.error_detail.as_deref(), Some("image could not be decoded"));
    assert!(stored.payload.is_none());
}

#[tokio::test]
async fn test_memory_store_semantics() {
    let store = MemoryResultStore::new();
    check_missing_is_none(&store).await;
    check_completed_overwrite_is_idempotent(&store).await;
    check_status_is_monotone(&store).await;
    check_error_record_round_trips(&store).await;
}

#[tokio::test]
async fn test_memory_store_injected_outage() {
    let store = MemoryResultStore::new();
    store.fail_next_puts(1);
    let record = ResultRecord::processing(WorkItemId::new());
    let err = store.put_result(&record).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(store.put_result(&record).await.unwrap().is_applied());
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_redis_store_semantics() {
    let config = ResultStoreConfig {
        redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into()),
        key_prefix: format!("fishid:test:{}:", uuid::Uuid::new_v4()),
    };
    let store = RedisResultStore::new(&config).unwrap();
    check_missing_is_none(&store).await;
    check_completed_overwrite_is_idempotent(&store).await;
    check_status_is_monotone(&store).await;
    check_error_record_round_trips(&store).await;
}
