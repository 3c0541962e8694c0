//! Redis-backed result store.
//!
//! Each work item is a hash with the serialized record plus its status and
//! status rank. The forward-only check and the write run in one Lua script so
//! concurrent writers cannot interleave between them.

use async_trait::async_trait;
use fishid_models::{ResultRecord, WorkItemId};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use tracing::debug;

use crate::error::{ResultStoreError, ResultStoreResult};
use crate::store::{ResultStore, WriteOutcome};

/// Highest rank; shared by both terminal statuses.
const TERMINAL_RANK: u8 = 2;

const PUT_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], 'status')
local incoming_rank = tonumber(ARGV[2])
if current then
  local current_rank = tonumber(redis.call('HGET', KEYS[1], 'rank'))
  if current_rank > incoming_rank then
    return 0
  end
  if current_rank == tonumber(ARGV[4]) and current ~= ARGV[1] then
    return 0
  end
end
redis.call('HSET', KEYS[1], 'status', ARGV[1], 'rank', ARGV[2], 'record', ARGV[3])
return 1
"#;

/// Result store configuration.
#[derive(Debug, Clone)]
pub struct ResultStoreConfig {
    pub redis_url: String,
    pub key_prefix: String,
}

impl Default for ResultStoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "fishid:result:".to_string(),
        }
    }
}

impl ResultStoreConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            key_prefix: std::env::var("RESULT_KEY_PREFIX").unwrap_or(defaults.key_prefix),
        }
    }
}

pub struct RedisResultStore {
    client: redis::Client,
    key_prefix: String,
    put_script: Script,
}

impl RedisResultStore {
    pub fn new(config: &ResultStoreConfig) -> ResultStoreResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            key_prefix: config.key_prefix.clone(),
            put_script: Script::new(PUT_SCRIPT),
        })
    }

    pub fn from_env() -> ResultStoreResult<Self> {
        Self::new(&ResultStoreConfig::from_env())
    }

    fn key(&self, id: &WorkItemId) -> String {
        format!("{}{}", self.key_prefix, id)
    }

    async fn connection(&self) -> ResultStoreResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| ResultStoreError::connection_failed(e.to_string()))
    }
}

#[async_trait]
impl ResultStore for RedisResultStore {
    async fn get_status(&self, id: &WorkItemId) -> ResultStoreResult<Option<ResultRecord>> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn.hget(self.key(id), "record").await?;

        raw.map(|json| {
            serde_json::from_str(&json).map_err(|e| ResultStoreError::CorruptRecord {
                id: id.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
    }

    async fn put_result(&self, record: &ResultRecord) -> ResultStoreResult<WriteOutcome> {
        let payload = serde_json::to_string(record)?;
        let mut conn = self.connection().await?;

        let applied: i32 = self
            .put_script
            .key(self.key(&record.work_item_id))
            .arg(record.status.as_str())
            .arg(record.status.rank())
            .arg(&payload)
            .arg(TERMINAL_RANK)
            .invoke_async(&mut conn)
            .await?;

        if applied == 1 {
            debug!(
                work_item_id = %record.work_item_id,
                status = %record.status,
                "Stored result record"
            );
            Ok(WriteOutcome::Applied)
        } else {
            debug!(
                work_item_id = %record.work_item_id,
                incoming = %record.status,
                "Ignoring regressive result write"
            );
            Ok(WriteOutcome::Superseded)
        }
    }

    async fn check_connectivity(&self) -> ResultStoreResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fishid_models::ResultStatus;

    #[test]
    fn test_terminal_rank_matches_model() {
        assert_eq!(ResultStatus::Completed.rank(), TERMINAL_RANK);
        assert_eq!(ResultStatus::Error.rank(), TERMINAL_RANK);
        assert!(ResultStatus::Processing.rank() < TERMINAL_RANK);
    }

    #[test]
    fn test_key_layout() {
        let store = RedisResultStore::new(&ResultStoreConfig::default()).unwrap();
        assert_eq!(
            store.key(&WorkItemId::from_string("abc-123")),
            "fishid:result:abc-123"
        );
    }
}
