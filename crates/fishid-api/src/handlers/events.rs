//! Object-write event ingestion.
//!
//! Storage (or a relay in front of it) posts S3-style notifications here.
//! Each request is authenticated by an HMAC-SHA256 of the raw body.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tracing::{info, warn};

use fishid_models::{parse_s3_notification, ParsedNotification};
use fishid_queue::QueueError;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying `sha256=<hex digest>` of the request body.
pub const SIGNATURE_HEADER: &str = "X-Fishid-Signature";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Body of the ingestion response.
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    /// Events handed to the work queue
    pub accepted: usize,
    /// Events whose key does not belong to a work item
    pub rejected: usize,
    pub message_ids: Vec<String>,
}

/// Signature header value for `body`.
pub fn sign_body(secret: &str, body: &[u8]) -> ApiResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ApiError::internal(format!("Invalid HMAC key: {}", e)))?;
    mac.update(body);
    Ok(format!(
        "{}{}",
        SIGNATURE_PREFIX,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Check a signature header value against `body` in constant time.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Some(hex_digest) = signature.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// `POST /internal/object-events`
pub async fn ingest_object_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<IngestResponse>)> {
    let secret = state
        .config
        .event_secret
        .as_deref()
        .ok_or_else(|| ApiError::unauthorized("Event ingestion is not configured"))?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Missing event signature"))?;

    if !verify_signature(secret, &body, signature) {
        warn!("Rejected object event with bad signature");
        metrics::record_auth_failure();
        return Err(ApiError::unauthorized("Invalid event signature"));
    }

    let text = std::str::from_utf8(&body)
        .map_err(|_| ApiError::bad_request("Event body is not UTF-8"))?;
    let parsed = parse_s3_notification(text).map_err(|e| ApiError::bad_request(e.to_string()))?;

    let events = match parsed {
        ParsedNotification::Events(events) => events,
        ParsedNotification::Unrecognised { keys } => {
            info!(keys = ?keys, "Ignoring notification without records");
            return Ok((
                StatusCode::ACCEPTED,
                Json(IngestResponse {
                    accepted: 0,
                    rejected: 0,
                    message_ids: Vec::new(),
                }),
            ));
        }
    };

    let mut response = IngestResponse {
        accepted: 0,
        rejected: 0,
        message_ids: Vec::with_capacity(events.len()),
    };

    for event in &events {
        match state.queue.send(event).await {
            Ok(message_id) => {
                info!(
                    key = %event.key,
                    message_id = %message_id,
                    "Object event enqueued"
                );
                response.accepted += 1;
                response.message_ids.push(message_id);
            }
            Err(QueueError::InvalidEvent(key)) => {
                warn!(key = %key, "Ignoring event for object outside the upload area");
                response.rejected += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    metrics::record_events(response.accepted, response.rejected);
    Ok((StatusCode::ACCEPTED, Json(response)))
}
