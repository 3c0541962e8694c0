//! Public front-end configuration.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use fishid_storage::UPLOAD_GRANT_TTL;

use crate::state::AppState;

/// Identity provider identifiers and polling advice.
///
/// None of these values are secret; the front end needs them before login.
#[derive(Debug, Serialize)]
pub struct ClientConfigResponse {
    pub region: String,
    pub pool_id: String,
    pub client_id: String,
    pub poll_interval_secs: u64,
    pub poll_max_attempts: u32,
    pub upload_grant_ttl_secs: u64,
}

pub async fn get_client_config(State(state): State<AppState>) -> Json<ClientConfigResponse> {
    let config = &state.config;
    Json(ClientConfigResponse {
        region: config.identity.region.clone(),
        pool_id: config.identity.pool_id.clone(),
        client_id: config.identity.client_id.clone(),
        poll_interval_secs: config.poll_interval.as_secs(),
        poll_max_attempts: config.poll_max_attempts,
        upload_grant_ttl_secs: UPLOAD_GRANT_TTL.as_secs(),
    })
}
