//! Result store abstraction.

use async_trait::async_trait;
use fishid_models::{ResultRecord, WorkItemId};

use crate::error::ResultStoreResult;

/// Outcome of a `put_result` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The record replaced whatever was stored
    Applied,
    /// The stored status is ahead of the incoming one; nothing was written
    Superseded,
}

impl WriteOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, WriteOutcome::Applied)
    }
}

/// Key-value store of result records.
///
/// Writes are last-writer-wins full overwrites, except that a write may not
/// move a record's status backward or from one terminal status to the other.
/// That check happens atomically inside the store.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Read the record for a work item. `None` means implicitly pending.
    async fn get_status(&self, id: &WorkItemId) -> ResultStoreResult<Option<ResultRecord>>;

    /// Overwrite the record for `record.work_item_id`.
    async fn put_result(&self, record: &ResultRecord) -> ResultStoreResult<WriteOutcome>;

    /// Reachability check used by the readiness endpoint.
    async fn check_connectivity(&self) -> ResultStoreResult<()>;
}
