//! Application state.

use std::sync::Arc;

use fishid_queue::{RedisWorkQueue, WorkQueue};
use fishid_results::{RedisResultStore, ResultStore};
use fishid_storage::{ObjectStore, S3ObjectStore, UploadCoordinator};

use crate::auth::{IdentityVerifier, JwksVerifier};
use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub uploads: UploadCoordinator,
    pub queue: Arc<dyn WorkQueue>,
    pub results: Arc<dyn ResultStore>,
    pub verifier: Arc<dyn IdentityVerifier>,
}

impl AppState {
    /// Assemble state from already constructed backends.
    pub fn new(
        config: ApiConfig,
        objects: Arc<dyn ObjectStore>,
        queue: Arc<dyn WorkQueue>,
        results: Arc<dyn ResultStore>,
        verifier: Arc<dyn IdentityVerifier>,
    ) -> Self {
        Self {
            config,
            uploads: UploadCoordinator::new(objects),
            queue,
            results,
            verifier,
        }
    }

    /// Connect the production backends described by the environment.
    pub async fn from_env(config: ApiConfig) -> anyhow::Result<Self> {
        let objects = S3ObjectStore::from_env()?;
        let queue = RedisWorkQueue::from_env()?;
        queue.init().await?;
        let results = RedisResultStore::from_env()?;
        let verifier = JwksVerifier::new(&config.identity)?;

        Ok(Self::new(
            config,
            Arc::new(objects),
            Arc::new(queue),
            Arc::new(results),
            Arc::new(verifier),
        ))
    }
}
