//! In-memory result store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use fishid_models::{ResultRecord, WorkItemId};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{ResultStoreError, ResultStoreResult};
use crate::store::{ResultStore, WriteOutcome};

/// Result store held in process memory.
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    records: Mutex<HashMap<WorkItemId, ResultRecord>>,
    write_history: Mutex<Vec<ResultRecord>>,
    failing_puts: AtomicU32,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes fail as if the store were unreachable.
    pub fn fail_next_puts(&self, count: u32) {
        self.failing_puts.store(count, Ordering::SeqCst);
    }

    /// Every applied write, in order.
    pub async fn write_history(&self) -> Vec<ResultRecord> {
        self.write_history.lock().await.clone()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn get_status(&self, id: &WorkItemId) -> ResultStoreResult<Option<ResultRecord>> {
        Ok(self.records.lock().await.get(id).cloned())
    }

    async fn put_result(&self, record: &ResultRecord) -> ResultStoreResult<WriteOutcome> {
        if self
            .failing_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ResultStoreError::unavailable("simulated outage"));
        }

        let mut records = self.records.lock().await;
        if let Some(current) = records.get(&record.work_item_id) {
            if !current.status.accepts(record.status) {
                debug!(
                    work_item_id = %record.work_item_id,
                    current = %current.status,
                    incoming = %record.status,
                    "Ignoring regressive result write"
                );
                return Ok(WriteOutcome::Superseded);
            }
        }

        records.insert(record.work_item_id.clone(), record.clone());
        self.write_history.lock().await.push(record.clone());
        Ok(WriteOutcome::Applied)
    }

    async fn check_connectivity(&self) -> ResultStoreResult<()> {
        Ok(())
    }
}
