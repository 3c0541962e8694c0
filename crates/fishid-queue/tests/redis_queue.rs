//! Redis Streams queue tests.
//!
//! These need a running Redis: `cargo test -p fishid-queue -- --ignored`.

use std::time::Duration;

use fishid_models::{ObjectWriteEvent, WorkItemId};
use fishid_queue::{QueueConfig, RedisWorkQueue, WorkQueue};

fn test_config(visibility: Duration) -> QueueConfig {
    let suffix = uuid::Uuid::new_v4();
    QueueConfig {
        redis_url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into()),
        stream_name: format!("fishid:test:events:{suffix}"),
        consumer_group: format!("fishid:test:group:{suffix}"),
        dlq_stream_name: format!("fishid:test:dlq:{suffix}"),
        max_receive_count: 3,
        visibility_timeout: visibility,
        receive_wait: Duration::from_millis(100),
    }
}

fn event() -> ObjectWriteEvent {
    let id = WorkItemId::new();
    ObjectWriteEvent::new("fish-uploads", id.object_key("jpg"), Some(42))
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_send_receive_ack() {
    let queue = RedisWorkQueue::new(test_config(Duration::from_secs(60))).unwrap();
    queue.init().await.unwrap();

    let sent = event();
    queue.send(&sent).await.unwrap();

    let messages = queue.receive(Duration::from_millis(500), 10).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].event, sent);
    assert_eq!(messages[0].delivery_count, 1);

    queue.ack(&messages[0]).await.unwrap();
    queue.ack(&messages[0]).await.unwrap();
    assert_eq!(queue.len().await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_expired_lease_redelivered_then_dead_lettered() {
    let visibility = Duration::from_millis(200);
    let queue = RedisWorkQueue::new(test_config(visibility)).unwrap();
    queue.init().await.unwrap();
    queue.send(&event()).await.unwrap();

    for expected in 1..=3 {
        let messages = queue.receive(Duration::from_millis(500), 1).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].delivery_count, expected);
        tokio::time::sleep(visibility + Duration::from_millis(50)).await;
    }

    let messages = queue.receive(Duration::from_millis(100), 1).await.unwrap();
    assert!(messages.is_empty());
    assert_eq!(queue.dead_letter_len().await.unwrap(), 1);
    assert_eq!(queue.len().await.unwrap(), 0);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_racing_consumers_dead_letter_once() {
    let visibility = Duration::from_millis(200);
    let config = test_config(visibility);
    let first = RedisWorkQueue::new(config.clone())
        .unwrap()
        .with_consumer_name("consumer-a");
    let second = RedisWorkQueue::new(config)
        .unwrap()
        .with_consumer_name("consumer-b");
    first.init().await.unwrap();
    first.send(&event()).await.unwrap();

    for _ in 0..3 {
        let messages = first.receive(Duration::from_millis(500), 1).await.unwrap();
        assert_eq!(messages.len(), 1);
        tokio::time::sleep(visibility + Duration::from_millis(50)).await;
    }

    let (a, b) = tokio::join!(
        first.receive(Duration::from_millis(100), 1),
        second.receive(Duration::from_millis(100), 1),
    );
    assert!(a.unwrap().is_empty());
    assert!(b.unwrap().is_empty());
    assert_eq!(first.dead_letter_len().await.unwrap(), 1);
    assert_eq!(first.len().await.unwrap(), 0);
}
