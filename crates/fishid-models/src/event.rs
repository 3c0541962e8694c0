//! Object-write events emitted by object storage.
//!
//! Storage publishes S3-style event notifications, sometimes wrapped in an
//! SNS envelope whose `Message` field carries the notification as a string.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::WorkItemId;

#[derive(Debug, Error, PartialEq)]
pub enum EventParseError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Malformed record {index}: {reason}")]
    MalformedRecord { index: usize, reason: String },
}

/// Signal that an object was written to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectWriteEvent {
    pub bucket: String,
    /// Decoded object key
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl ObjectWriteEvent {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, size: Option<u64>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            size,
        }
    }

    /// Work item the object belongs to, if the key follows the upload convention.
    pub fn work_item_id(&self) -> Option<WorkItemId> {
        WorkItemId::from_object_key(&self.key)
    }

    /// Render as an S3 event notification document.
    pub fn to_s3_notification(&self) -> Value {
        let mut object = serde_json::json!({ "key": encode_key(&self.key) });
        if let Some(size) = self.size {
            object["size"] = Value::from(size);
        }
        serde_json::json!({
            "Records": [{
                "eventSource": "aws:s3",
                "eventName": "ObjectCreated:Put",
                "s3": {
                    "bucket": { "name": self.bucket },
                    "object": object,
                }
            }]
        })
    }
}

/// Result of parsing a notification body.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedNotification {
    /// One event per object-creation record
    Events(Vec<ObjectWriteEvent>),
    /// The body carried no `Records`; top-level keys are kept for logging
    Unrecognised { keys: Vec<String> },
}

impl ParsedNotification {
    pub fn into_events(self) -> Vec<ObjectWriteEvent> {
        match self {
            ParsedNotification::Events(events) => events,
            ParsedNotification::Unrecognised { .. } => Vec::new(),
        }
    }
}

/// Parse an S3 event notification, optionally wrapped in an SNS envelope.
pub fn parse_s3_notification(body: &str) -> Result<ParsedNotification, EventParseError> {
    let mut doc: Value =
        serde_json::from_str(body).map_err(|e| EventParseError::InvalidJson(e.to_string()))?;

    if let Some(Value::String(inner)) = doc.get("Message") {
        doc = serde_json::from_str(inner).map_err(|e| EventParseError::InvalidJson(e.to_string()))?;
    }

    let records = match doc.get("Records").and_then(Value::as_array) {
        Some(records) => records,
        None => {
            let keys = doc
                .as_object()
                .map(|obj| obj.keys().cloned().collect())
                .unwrap_or_default();
            return Ok(ParsedNotification::Unrecognised { keys });
        }
    };

    let mut events = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let event_name = record.get("eventName").and_then(Value::as_str);
        if matches!(event_name, Some(name) if !name.starts_with("ObjectCreated")) {
            continue;
        }

        let malformed = |reason: &str| EventParseError::MalformedRecord {
            index,
            reason: reason.to_string(),
        };
        let s3 = record.get("s3").ok_or_else(|| malformed("missing s3"))?;
        let bucket = s3
            .pointer("/bucket/name")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("missing bucket name"))?;
        let raw_key = s3
            .pointer("/object/key")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("missing object key"))?;
        let key = decode_key(raw_key).ok_or_else(|| malformed("key is not valid UTF-8"))?;
        let size = s3.pointer("/object/size").and_then(Value::as_u64);

        events.push(ObjectWriteEvent::new(bucket, key, size));
    }

    Ok(ParsedNotification::Events(events))
}

/// Decode a form-encoded object key (`+` is a space).
fn decode_key(raw: &str) -> Option<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced).ok().map(|s| s.into_owned())
}

fn encode_key(key: &str) -> String {
    urlencoding::encode(key).replace("%2F", "/").replace("%20", "+")
}

#[cfg(test)]
mod tests {
    use super::*;

    const S3_BODY: &str = r#"{
        "Records": [{
            "eventName": "ObjectCreated:Put",
            "s3": {
                "bucket": {"name": "fish-uploads"},
                "object": {"key": "uploads/6f1c2a9e-0000-4000-8000-000000000001.jpg", "size": 1024}
            }
        }]
    }"#;

    #[test]
    fn test_parse_plain_notification() {
        let events = parse_s3_notification(S3_BODY).unwrap().into_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].bucket, "fish-uploads");
        assert_eq!(events[0].size, Some(1024));
        assert_eq!(
            events[0].work_item_id().unwrap().as_str(),
            "6f1c2a9e-0000-4000-8000-000000000001"
        );
    }

    #[test]
    fn test_parse_sns_envelope() {
        let envelope = serde_json::json!({ "Type": "Notification", "Message": S3_BODY }).to_string();
        let events = parse_s3_notification(&envelope).unwrap().into_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].bucket, "fish-uploads");
    }

    #[test]
    fn test_key_is_url_decoded() {
        let body = r#"{"Records":[{"s3":{"bucket":{"name":"b"},"object":{"key":"uploads/my+fish%281%29.jpg"}}}]}"#;
        let events = parse_s3_notification(body).unwrap().into_events();
        assert_eq!(events[0].key, "uploads/my fish(1).jpg");
        assert_eq!(events[0].size, None);
    }

    #[test]
    fn test_unrecognised_body_is_skipped() {
        let parsed = parse_s3_notification(r#"{"Event":"s3:TestEvent","Bucket":"b"}"#).unwrap();
        match parsed {
            ParsedNotification::Unrecognised { keys } => {
                assert!(keys.contains(&"Event".to_string()));
            }
            other => panic!("expected unrecognised, got {other:?}"),
        }
    }

    #[test]
    fn test_non_create_records_ignored() {
        let body = r#"{"Records":[{"eventName":"ObjectRemoved:Delete","s3":{}}]}"#;
        assert_eq!(parse_s3_notification(body).unwrap().into_events(), vec![]);
    }

    #[test]
    fn test_malformed_inputs() {
        assert!(matches!(
            parse_s3_notification("not json"),
            Err(EventParseError::InvalidJson(_))
        ));
        assert!(matches!(
            parse_s3_notification(r#"{"Records":[{"s3":{"bucket":{"name":"b"}}}]}"#),
            Err(EventParseError::MalformedRecord { index: 0, .. })
        ));
    }

    #[test]
    fn test_notification_rendering_parses_back() {
        let event = ObjectWriteEvent::new("b", "uploads/a b.png", Some(7));
        let body = event.to_s3_notification().to_string();
        let events = parse_s3_notification(&body).unwrap().into_events();
        assert_eq!(events, vec![event]);
    }
}
