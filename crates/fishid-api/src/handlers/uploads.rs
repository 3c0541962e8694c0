//! Upload grant handler.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use fishid_models::UploadGrant;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Filename assumed when the client sends none.
const DEFAULT_FILENAME: &str = "image.jpg";

/// Query for `GET /api/upload-url`.
#[derive(Debug, Deserialize, Validate)]
pub struct UploadUrlQuery {
    /// Advisory client filename; only its extension is used
    #[validate(length(min = 1, max = 255))]
    pub filename: Option<String>,
}

/// Issue a presigned write for a new work item.
pub async fn get_upload_url(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<UploadUrlQuery>,
) -> ApiResult<Json<UploadGrant>> {
    query
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let filename = query.filename.as_deref().unwrap_or(DEFAULT_FILENAME);
    let grant = state.uploads.request_upload_grant(filename).await?;

    info!(
        user = %user.subject,
        work_item_id = %grant.work_item_id,
        object_key = %grant.object_key,
        "Upload grant issued"
    );
    metrics::record_upload_grant();

    Ok(Json(grant))
}
