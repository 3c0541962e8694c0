//! Payload schema handler.

use axum::Json;
use schemars::schema::RootSchema;

use fishid_models::IdentificationPayload;

/// JSON Schema of the identification payload.
pub async fn get_result_schema() -> Json<RootSchema> {
    Json(IdentificationPayload::json_schema())
}
