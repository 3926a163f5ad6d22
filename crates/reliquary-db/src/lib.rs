//! Reliquary Database Layer
//!
//! PostgreSQL repositories for users, works, uploaded files, file sets, the
//! task queue and the attachment activity stream, plus the collaborator traits
//! the attachment pipeline is written against.
//!
// Module declarations
pub mod attach_traits;
pub mod db;

// Re-exports: repositories and helpers
pub use db::{
    merge_ordered_members, run_migrations, ActivityRepository, FileSetRepository, TaskRepository,
    UploadedFileRepository, UserRepository, WorkRepository, TASK_NOTIFY_CHANNEL,
};

// Re-exports: Transaction utilities
pub use db::transaction::TransactionGuard;

// Re-exports: Collaborator traits
pub use attach_traits::{ActivityStore, FileSetStore, UploadedFileStore, UserDirectory, WorkStore};
