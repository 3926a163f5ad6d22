//! Database repositories for the data access layer
//!
//! `repository/` holds one repository per record type of the attachment
//! pipeline; `task` backs the job queue.

pub mod repository;
pub mod task;
pub mod transaction;

pub use repository::{
    merge_ordered_members, ActivityRepository, FileSetRepository, UploadedFileRepository,
    UserRepository, WorkRepository,
};
pub use task::{TaskRepository, TASK_NOTIFY_CHANNEL};

use sqlx::PgPool;

/// Apply the schema in `crates/reliquary-db/migrations`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}
