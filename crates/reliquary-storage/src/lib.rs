//! Reliquary Storage Library
//!
//! Storage abstraction for uploaded files and the content bound to file sets,
//! with S3 (via `object_store`) and local filesystem backends.
//!
//! # Storage key format
//!
//! - **Uploads**: written by the upload subsystem; their keys are opaque here.
//! - **File set content**: `file_sets/{file_set_id}/{filename}`
//!
//! Keys must not contain `..` or a leading `/`. Key generation lives in the
//! `keys` module so all backends stay consistent.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use keys::file_set_content_key;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use reliquary_core::StorageBackend;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
