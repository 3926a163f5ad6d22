//! Test helpers for the attachment job
//!
//! This module provides in-memory implementations of the collaborator traits
//! and storage, plus fixtures for isolated testing without a database.

pub mod fixtures;
pub mod mock_repositories;
pub mod mock_storage;

pub use fixtures::*;
pub use mock_repositories::*;
pub use mock_storage::*;
