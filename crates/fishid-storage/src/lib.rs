//! Object storage for uploaded photographs.
//!
//! This crate provides:
//! - The `ObjectStore` abstraction over S3-compatible storage
//! - An aws-sdk-s3 backed implementation
//! - An in-memory implementation for tests and local runs
//! - The upload coordinator that issues time-limited write grants

pub mod client;
pub mod coordinator;
pub mod error;
pub mod memory;
pub mod store;

pub use client::{S3Config, S3ObjectStore};
pub use coordinator::{UploadCoordinator, UPLOAD_GRANT_TTL};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryObjectStore;
pub use store::{content_type_for, ObjectStore, PresignedWrite};
