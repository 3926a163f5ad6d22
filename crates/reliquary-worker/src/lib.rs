//! Reliquary Worker Library
//!
//! The task queue and worker pool, plus the job that attaches batches of
//! uploaded files to works:
//!
//! - `queue`: named-queue worker pool over PostgreSQL with retries and backoff
//! - `jobs`: the attachment orchestrator
//! - `actors`: file set creation and ordered-membership commit
//! - `handlers`: task dispatch for the worker binary

pub mod actors;
pub mod context;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod queue;
pub mod test_helpers;

pub use actors::{ActivityStreamCallback, AttachmentCallback, FileSetActor, OrderedMembersActor};
pub use context::{empty_context_weak, TaskHandlerContext};
pub use error::AttachError;
pub use handlers::AttachmentWorkerContext;
pub use jobs::{enqueue_attach_files, AttachFilesToWork, AttachOutcome, AttachServices};
pub use queue::{TaskQueue, TaskQueueConfig, TaskSubmitter, MAX_RETRY_BACKOFF_SECS};
