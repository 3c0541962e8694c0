//! Shared data models for the FishID pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Work items and upload grants
//! - Result records and their status lifecycle
//! - The versioned identification payload
//! - Species reference data
//! - Object-write events emitted by storage

pub mod event;
pub mod grant;
pub mod payload;
pub mod result;
pub mod species;
pub mod work_item;

// Re-export common types
pub use event::{parse_s3_notification, EventParseError, ObjectWriteEvent, ParsedNotification};
pub use grant::UploadGrant;
pub use payload::{IdentificationPayload, PayloadError, PAYLOAD_SCHEMA_VERSION, REVIEW_CONFIDENCE_THRESHOLD};
pub use result::{ResultRecord, ResultStatus};
pub use species::{SpeciesCatalog, SpeciesCatalogError, SpeciesInfo, SPECIES_CATALOG_PATH_ENV};
pub use work_item::{infer_extension, WorkItem, WorkItemId, UPLOAD_PREFIX};
