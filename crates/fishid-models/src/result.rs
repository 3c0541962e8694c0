//! Result records and the status lifecycle.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{IdentificationPayload, WorkItemId};

/// Processing status of a work item.
///
/// Transitions only move forward: `pending -> processing -> {completed, error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    /// No record written yet, or the object is still waiting in the queue
    #[default]
    Pending,
    /// A worker holds the lease and is classifying
    Processing,
    /// Classification succeeded
    Completed,
    /// Classification failed permanently
    Error,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Pending => "pending",
            ResultStatus::Processing => "processing",
            ResultStatus::Completed => "completed",
            ResultStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ResultStatus::Completed | ResultStatus::Error)
    }

    /// Position in the lifecycle. Terminal statuses share the highest rank.
    pub fn rank(&self) -> u8 {
        match self {
            ResultStatus::Pending => 0,
            ResultStatus::Processing => 1,
            ResultStatus::Completed | ResultStatus::Error => 2,
        }
    }

    /// Whether a record currently in `self` may be overwritten by one in `next`.
    ///
    /// Same-status rewrites are allowed so that redelivered work can overwrite
    /// its own terminal record.
    pub fn accepts(&self, next: ResultStatus) -> bool {
        if self.is_terminal() {
            return *self == next;
        }
        next.rank() >= self.rank()
    }

    /// Parse the wire representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ResultStatus::Pending),
            "processing" => Some(ResultStatus::Processing),
            "completed" => Some(ResultStatus::Completed),
            "error" => Some(ResultStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The persisted outcome for a work item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResultRecord {
    pub work_item_id: WorkItemId,

    pub status: ResultStatus,

    /// Present only when `status` is `completed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<IdentificationPayload>,

    /// Present only when `status` is `error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,

    pub updated_at: DateTime<Utc>,
}

impl ResultRecord {
    fn with_status(work_item_id: WorkItemId, status: ResultStatus) -> Self {
        Self {
            work_item_id,
            status,
            payload: None,
            error_detail: None,
            updated_at: Utc::now(),
        }
    }

    pub fn pending(work_item_id: WorkItemId) -> Self {
        Self::with_status(work_item_id, ResultStatus::Pending)
    }

    pub fn processing(work_item_id: WorkItemId) -> Self {
        Self::with_status(work_item_id, ResultStatus::Processing)
    }

    pub fn completed(work_item_id: WorkItemId, payload: IdentificationPayload) -> Self {
        let mut record = Self::with_status(work_item_id, ResultStatus::Completed);
        record.payload = Some(payload);
        record
    }

    pub fn error(work_item_id: WorkItemId, detail: impl Into<String>) -> Self {
        let mut record = Self::with_status(work_item_id, ResultStatus::Error);
        record.error_detail = Some(detail.into());
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        use ResultStatus::*;
        assert!(Pending.accepts(Processing));
        assert!(Pending.accepts(Completed));
        assert!(Processing.accepts(Processing));
        assert!(Processing.accepts(Error));
        assert!(Completed.accepts(Completed));
        assert!(Error.accepts(Error));
    }

    #[test]
    fn test_backward_and_cross_terminal_rejected() {
        use ResultStatus::*;
        assert!(!Processing.accepts(Pending));
        assert!(!Completed.accepts(Processing));
        assert!(!Completed.accepts(Error));
        assert!(!Error.accepts(Completed));
        assert!(!Error.accepts(Pending));
    }

    #[test]
    fn test_status_wire_format() {
        for status in [
            ResultStatus::Pending,
            ResultStatus::Processing,
            ResultStatus::Completed,
            ResultStatus::Error,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(ResultStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ResultStatus::parse("done"), None);
    }

    #[test]
    fn test_error_record_omits_payload() {
        let record = ResultRecord::error(WorkItemId::from_string("item-0001"), "bad image");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error_detail"], "bad image");
        assert!(json.get("payload").is_none());
    }
}
