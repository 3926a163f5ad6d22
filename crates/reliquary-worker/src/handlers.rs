//! Task dispatch for the attachment worker

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use reliquary_core::models::{AttachFilesToWorkPayload, AttachFilesToWorkResult, Task, TaskType};
use reliquary_core::{ErrorMetadata, LogLevel, TaskError};

use crate::context::TaskHandlerContext;
use crate::error::AttachError;
use crate::jobs::AttachFilesToWork;

/// Routes claimed tasks to the attachment job
pub struct AttachmentWorkerContext {
    job: AttachFilesToWork,
}

impl AttachmentWorkerContext {
    pub fn new(job: AttachFilesToWork) -> Self {
        Self { job }
    }

    #[tracing::instrument(skip(self, task), fields(task.id = %task.id))]
    async fn handle_attach_files(&self, task: &Task) -> Result<serde_json::Value> {
        let payload: AttachFilesToWorkPayload = task.try_payload_as().map_err(|e| {
            TaskError::unrecoverable(AttachError::InvalidPayload(e.to_string()))
        })?;

        let outcome = match self.job.run(&payload).await {
            Ok(outcome) => outcome,
            Err(err) => {
                log_attach_error(task, &err);
                return Err(err.into_task_error().into());
            }
        };

        let result = AttachFilesToWorkResult {
            work_id: outcome.work_id,
            file_set_ids: outcome.file_set_ids(),
            ordered_member_count: outcome.ordered_member_ids.len(),
        };
        Ok(serde_json::to_value(result)?)
    }
}

fn log_attach_error(task: &Task, err: &AttachError) {
    let orphaned = err.orphaned();
    match err.log_level() {
        LogLevel::Error => tracing::error!(
            task_id = %task.id,
            error_code = err.error_code(),
            recoverable = err.is_recoverable(),
            orphaned = ?orphaned,
            error = %err,
            "Attachment job failed"
        ),
        _ => tracing::warn!(
            task_id = %task.id,
            error_code = err.error_code(),
            recoverable = err.is_recoverable(),
            error = %err,
            "Attachment job rejected"
        ),
    }
}

#[async_trait]
impl TaskHandlerContext for AttachmentWorkerContext {
    async fn dispatch_task(self: Arc<Self>, task: &Task) -> Result<serde_json::Value> {
        match task.task_type {
            TaskType::AttachFilesToWork => self.handle_attach_files(task).await,
        }
    }
}
