//! Attachment job errors
//!
//! Each variant knows whether retrying the whole job could succeed. The
//! dispatch layer turns that into a recoverable or unrecoverable
//! [`TaskError`].

use reliquary_core::error::{AppError, ErrorMetadata, LogLevel};
use reliquary_core::TaskError;
use reliquary_storage::StorageError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AttachError {
    #[error("Invalid job payload: {0}")]
    InvalidPayload(String),

    #[error("Batch element {position}: uploaded file required, but {found} received")]
    InvalidUpload { position: usize, found: String },

    #[error("Work not found: {0}")]
    WorkNotFound(Uuid),

    #[error("Depositor not found: {0}")]
    DepositorNotFound(String),

    #[error("Invalid visibility metadata: {0}")]
    InvalidMetadata(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] AppError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(
        "Failed to create file set for upload {upload_id} (batch element {position}, {} orphaned): {source}",
        orphaned.len()
    )]
    ChildCreation {
        position: usize,
        upload_id: Uuid,
        /// File sets left attached by parent reference but outside the member list
        orphaned: Vec<Uuid>,
        #[source]
        source: Box<AttachError>,
    },

    #[error("Failed to commit ordered members of work {work_id} ({} orphaned): {source}", orphaned.len())]
    Commit {
        work_id: Uuid,
        orphaned: Vec<Uuid>,
        #[source]
        source: AppError,
    },

    #[error("Post-attachment callback failed: {0}")]
    Callback(#[source] anyhow::Error),
}

impl AttachError {
    /// File sets this failure left outside the work's member list
    pub fn orphaned(&self) -> &[Uuid] {
        match self {
            AttachError::ChildCreation { orphaned, .. } | AttachError::Commit { orphaned, .. } => {
                orphaned
            }
            _ => &[],
        }
    }

    /// Convert into the queue's error type, keeping recoverability
    pub fn into_task_error(self) -> TaskError {
        if self.is_recoverable() {
            TaskError::recoverable(self)
        } else {
            TaskError::unrecoverable(self)
        }
    }
}

impl ErrorMetadata for AttachError {
    fn error_code(&self) -> &'static str {
        match self {
            AttachError::InvalidPayload(_) => "INVALID_PAYLOAD",
            AttachError::InvalidUpload { .. } => "INVALID_UPLOAD",
            AttachError::WorkNotFound(_) => "WORK_NOT_FOUND",
            AttachError::DepositorNotFound(_) => "DEPOSITOR_NOT_FOUND",
            AttachError::InvalidMetadata(_) => "INVALID_METADATA",
            AttachError::Persistence(err) => err.error_code(),
            AttachError::Storage(_) => "STORAGE_ERROR",
            AttachError::ChildCreation { .. } => "CHILD_CREATION_FAILED",
            AttachError::Commit { .. } => "COMMIT_FAILED",
            AttachError::Callback(_) => "CALLBACK_FAILED",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            AttachError::InvalidPayload(_)
            | AttachError::InvalidUpload { .. }
            | AttachError::WorkNotFound(_)
            | AttachError::InvalidMetadata(_)
            | AttachError::Callback(_) => false,
            // The depositor account may be provisioned after the job was queued.
            AttachError::DepositorNotFound(_) => true,
            AttachError::Persistence(err) => err.is_recoverable(),
            AttachError::Storage(err) => err.is_transient(),
            AttachError::ChildCreation {
                orphaned, source, ..
            } => orphaned.is_empty() && source.is_recoverable(),
            AttachError::Commit {
                orphaned, source, ..
            } => orphaned.is_empty() && source.is_recoverable(),
        }
    }

    fn suggested_action(&self) -> Option<&'static str> {
        match self {
            AttachError::InvalidPayload(_) | AttachError::InvalidUpload { .. } => {
                Some("Resubmit the job with registered uploaded file ids")
            }
            AttachError::WorkNotFound(_) => Some("Verify the work exists before enqueueing"),
            AttachError::DepositorNotFound(_) => Some("Create the depositing user account"),
            AttachError::InvalidMetadata(_) => Some("Fix the visibility attributes and resubmit"),
            AttachError::ChildCreation { .. } | AttachError::Commit { .. } => {
                Some("Inspect the orphaned file sets before resubmitting")
            }
            AttachError::Callback(_) => Some("Members were committed; replay the activity event"),
            AttachError::Persistence(_) | AttachError::Storage(_) => {
                Some("Retry after a short delay")
            }
        }
    }

    fn log_level(&self) -> LogLevel {
        match self {
            AttachError::InvalidPayload(_)
            | AttachError::InvalidUpload { .. }
            | AttachError::InvalidMetadata(_) => LogLevel::Warn,
            AttachError::WorkNotFound(_) | AttachError::DepositorNotFound(_) => LogLevel::Warn,
            _ => LogLevel::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child_creation(orphaned: Vec<Uuid>) -> AttachError {
        AttachError::ChildCreation {
            position: 1,
            upload_id: Uuid::new_v4(),
            orphaned,
            source: Box::new(AttachError::Storage(StorageError::BackendError(
                "503 Slow Down".to_string(),
            ))),
        }
    }

    #[test]
    fn input_errors_are_unrecoverable() {
        let invalid = AttachError::InvalidUpload {
            position: 0,
            found: "number".to_string(),
        };
        assert!(!invalid.is_recoverable());
        assert!(invalid
            .to_string()
            .contains("uploaded file required, but number received"));
        assert!(!AttachError::WorkNotFound(Uuid::new_v4()).is_recoverable());
        assert!(!AttachError::InvalidMetadata("bad date".to_string()).is_recoverable());
        assert!(!AttachError::Callback(anyhow::anyhow!("down")).is_recoverable());
    }

    #[test]
    fn transient_errors_are_recoverable() {
        assert!(AttachError::DepositorNotFound("a@example.org".to_string()).is_recoverable());
        assert!(AttachError::Persistence(AppError::Internal("pool".to_string())).is_recoverable());
        assert!(AttachError::Storage(StorageError::BackendError("503".to_string())).is_recoverable());
    }

    #[test]
    fn permanent_causes_stay_unrecoverable() {
        assert!(!AttachError::Storage(StorageError::NotFound("uploads/a.pdf".to_string()))
            .is_recoverable());
        assert!(
            !AttachError::Persistence(AppError::NotFound("file set".to_string())).is_recoverable()
        );
        let err = AttachError::ChildCreation {
            position: 0,
            upload_id: Uuid::new_v4(),
            orphaned: Vec::new(),
            source: Box::new(AttachError::InvalidMetadata("bad date".to_string())),
        };
        assert!(!err.is_recoverable());
    }

    #[test]
    fn orphans_make_partial_failures_unrecoverable() {
        assert!(child_creation(Vec::new()).is_recoverable());

        let orphan = Uuid::new_v4();
        let err = child_creation(vec![orphan]);
        assert!(!err.is_recoverable());
        assert_eq!(err.orphaned(), &[orphan]);
        assert!(err.to_string().contains("1 orphaned"));

        let commit = AttachError::Commit {
            work_id: Uuid::new_v4(),
            orphaned: vec![orphan],
            source: AppError::Internal("deadlock".to_string()),
        };
        assert!(!commit.is_recoverable());
    }

    #[test]
    fn into_task_error_keeps_classification() {
        let task_err = AttachError::WorkNotFound(Uuid::new_v4()).into_task_error();
        assert!(!task_err.is_recoverable());
        let task_err =
            AttachError::Persistence(AppError::Internal("pool".to_string())).into_task_error();
        assert!(task_err.is_recoverable());
    }
}
