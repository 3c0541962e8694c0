//! Upload credentials handed to clients.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::WorkItemId;

/// Time-limited permission to write exactly one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UploadGrant {
    /// Work item the upload belongs to
    pub work_item_id: WorkItemId,

    /// Storage key the object must be written to
    pub object_key: String,

    /// Presigned URL the client writes to
    pub write_endpoint: String,

    /// HTTP method for the write
    pub method: String,

    /// Headers the client must send with the write
    #[serde(default)]
    pub credential_fields: BTreeMap<String, String>,

    /// Validity window in seconds
    pub expires_in_secs: u64,

    /// Absolute expiry time
    pub expires_at: DateTime<Utc>,
}

impl UploadGrant {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_expiry_boundary() {
        let issued = Utc::now();
        let grant = UploadGrant {
            work_item_id: WorkItemId::new(),
            object_key: "uploads/x.jpg".into(),
            write_endpoint: "https://storage.example/uploads/x.jpg".into(),
            method: "PUT".into(),
            credential_fields: BTreeMap::new(),
            expires_in_secs: 300,
            expires_at: issued + Duration::seconds(300),
        };
        assert!(!grant.is_expired_at(issued + Duration::seconds(299)));
        assert!(grant.is_expired_at(issued + Duration::seconds(300)));
    }
}
