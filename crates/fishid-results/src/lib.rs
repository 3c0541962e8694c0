//! Result store for work item outcomes.
//!
//! Records are full overwrites keyed by work item id. The only guard is the
//! forward-only status rule, enforced atomically inside each store.

pub mod error;
pub mod memory;
pub mod redis_store;
pub mod store;

pub use error::{ResultStoreError, ResultStoreResult};
pub use memory::MemoryResultStore;
pub use redis_store::{RedisResultStore, ResultStoreConfig};
pub use store::{ResultStore, WriteOutcome};
