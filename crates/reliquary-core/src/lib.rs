//! Reliquary Core Library
//!
//! This crate provides the domain models, error types and configuration shared by
//! the storage, database and worker crates: uploaded files, works, file sets,
//! permission grants, visibility terms and queued tasks.

pub mod config;
pub mod error;
pub mod models;
pub mod storage_types;
pub mod task_error;

// Re-export commonly used types
pub use config::{Config, OrphanPolicy};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use storage_types::StorageBackend;
pub use task_error::{TaskError, TaskResultExt};
