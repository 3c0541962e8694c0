//! Result lookup handler.

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use fishid_models::{IdentificationPayload, ResultStatus, WorkItemId};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Body of `GET /api/results/:work_item_id`.
#[derive(Debug, Serialize)]
pub struct ResultResponse {
    pub work_item_id: WorkItemId,
    pub status: ResultStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<IdentificationPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Read the current result for a work item.
///
/// A missing record is reported as `pending`: the item may still be queued.
pub async fn get_result(
    State(state): State<AppState>,
    user: AuthUser,
    Path(work_item_id): Path<String>,
) -> ApiResult<Json<ResultResponse>> {
    if !WorkItemId::is_valid(&work_item_id) {
        return Err(ApiError::bad_request("Invalid work item ID"));
    }
    let id = WorkItemId::from_string(work_item_id);

    let response = match state.results.get_status(&id).await? {
        Some(record) => ResultResponse {
            work_item_id: record.work_item_id,
            status: record.status,
            payload: record.payload,
            error_detail: record.error_detail,
            updated_at: Some(record.updated_at),
        },
        None => ResultResponse {
            work_item_id: id,
            status: ResultStatus::Pending,
            payload: None,
            error_detail: None,
            updated_at: None,
        },
    };

    debug!(
        user = %user.subject,
        work_item_id = %response.work_item_id,
        status = %response.status,
        "Result lookup"
    );

    Ok(Json(response))
}
