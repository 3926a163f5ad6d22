//! Task handler context trait
//!
//! The worker binary implements this trait for the attachment services. The
//! queue calls `dispatch_task` when processing a task; the implementation
//! matches on task type and invokes the appropriate handler.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::{Arc, Weak};

use reliquary_core::models::Task;

/// Context for task dispatch.
///
/// The queue holds a weak reference and calls `dispatch_task` when processing
/// a claimed task. Returned errors may wrap a [`reliquary_core::TaskError`] to
/// control retries.
#[async_trait]
pub trait TaskHandlerContext: Send + Sync {
    /// Dispatch a task to the appropriate handler and return the result.
    async fn dispatch_task(self: Arc<Self>, task: &Task) -> Result<serde_json::Value>;
}

/// Placeholder context for queues that only submit tasks. Dispatch always errors.
struct NoopContext;

#[async_trait]
impl TaskHandlerContext for NoopContext {
    async fn dispatch_task(self: Arc<Self>, _task: &Task) -> Result<serde_json::Value> {
        Err(anyhow!("NoopContext: no handler context available"))
    }
}

/// Returns a weak reference to a no-op context.
pub fn empty_context_weak() -> Weak<dyn TaskHandlerContext> {
    let n: Arc<dyn TaskHandlerContext> = Arc::new(NoopContext);
    Arc::downgrade(&n)
}
