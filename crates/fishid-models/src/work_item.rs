//! Work item identity and storage key conventions.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Prefix under which uploaded objects are stored.
pub const UPLOAD_PREFIX: &str = "uploads/";

/// Extension used when the advisory filename does not carry a usable one.
const DEFAULT_EXTENSION: &str = "jpg";

/// Longest extension accepted from a client filename.
const MAX_EXTENSION_LEN: usize = 8;

/// Unique identifier for a work item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct WorkItemId(pub String);

impl WorkItemId {
    /// Generate a new random work item ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage key for the object belonging to this work item.
    pub fn object_key(&self, extension: &str) -> String {
        format!("{}{}.{}", UPLOAD_PREFIX, self.0, extension)
    }

    /// Recover the work item ID embedded in a storage key.
    ///
    /// Returns `None` for keys outside the upload prefix or whose stem is not
    /// a valid id.
    pub fn from_object_key(key: &str) -> Option<Self> {
        let name = key.strip_prefix(UPLOAD_PREFIX)?;
        let id = match name.rsplit_once('.') {
            Some((stem, _)) => stem,
            None => name,
        };
        if !Self::is_valid(id) {
            return None;
        }
        Some(Self(id.to_string()))
    }

    /// Validate the ID format used in URLs.
    ///
    /// Valid format: alphanumeric characters and hyphens only, 8-64 chars.
    pub fn is_valid(id: &str) -> bool {
        if id.len() < 8 || id.len() > 64 {
            return false;
        }
        id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    }
}

impl Default for WorkItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A submitted object awaiting classification.
///
/// Exists from the moment upload credentials are issued, before any queue
/// message is produced for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub created_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn new() -> Self {
        Self {
            id: WorkItemId::new(),
            created_at: Utc::now(),
        }
    }
}

impl Default for WorkItem {
    fn default() -> Self {
        Self::new()
    }
}

/// Infer a storage extension from an advisory client filename.
///
/// Path components are stripped and the suffix after the last dot is used
/// when it is short and alphanumeric. Anything else falls back to `jpg`.
pub fn infer_extension(filename: &str) -> String {
    let name = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();

    match name.rsplit_once('.') {
        Some((_, ext))
            if !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            ext.to_ascii_lowercase()
        }
        _ => DEFAULT_EXTENSION.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_roundtrip() {
        let id = WorkItemId::new();
        let key = id.object_key("png");
        assert!(key.starts_with(UPLOAD_PREFIX));
        assert_eq!(WorkItemId::from_object_key(&key), Some(id));
    }

    #[test]
    fn test_from_object_key_rejects_foreign_keys() {
        assert_eq!(WorkItemId::from_object_key("other/abc.jpg"), None);
        assert_eq!(WorkItemId::from_object_key("uploads/.jpg"), None);
        assert_eq!(WorkItemId::from_object_key("uploads/a/b.jpg"), None);
    }

    #[test]
    fn test_from_object_key_rejects_invalid_ids() {
        assert_eq!(WorkItemId::from_object_key("uploads/x.jpg"), None);
        assert_eq!(WorkItemId::from_object_key("uploads/bad_id_123.jpg"), None);
        assert_eq!(
            WorkItemId::from_object_key("uploads/item-0001.jpg"),
            Some(WorkItemId::from_string("item-0001"))
        );
    }

    #[test]
    fn test_infer_extension() {
        assert_eq!(infer_extension("fish1.jpg"), "jpg");
        assert_eq!(infer_extension("My Catch.PNG"), "png");
        assert_eq!(infer_extension("../../etc/photo.heic"), "heic");
        assert_eq!(infer_extension("C:\\Users\\me\\img.jpeg"), "jpeg");
        assert_eq!(infer_extension("no_extension"), "jpg");
        assert_eq!(infer_extension("weird.ext!"), "jpg");
        assert_eq!(infer_extension("trailing."), "jpg");
        assert_eq!(infer_extension(""), "jpg");
    }

    #[test]
    fn test_id_validation() {
        assert!(WorkItemId::is_valid(WorkItemId::new().as_str()));
        assert!(!WorkItemId::is_valid("short"));
        assert!(!WorkItemId::is_valid("has/slash-in-the-middle"));
    }
}
