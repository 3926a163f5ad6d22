//! Task execution error types
//!
//! A queued job reports failures through [`TaskError`], which records whether the
//! queue should schedule a retry or mark the task failed straight away.

use std::fmt;

use crate::error::{AppError, ErrorMetadata};

/// Task execution error that can be either recoverable or unrecoverable
#[derive(Debug)]
pub struct TaskError {
    inner: anyhow::Error,
    recoverable: bool,
}

impl TaskError {
    /// Create an unrecoverable task error.
    ///
    /// The queue fails the task immediately. Use for input that will not change
    /// on retry (malformed batches, unknown works, invalid visibility terms) and
    /// for failures after side effects that a retry would duplicate.
    pub fn unrecoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: false,
        }
    }

    /// Create a recoverable task error, retried according to the task's retry policy.
    pub fn recoverable(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            recoverable: true,
        }
    }

    /// Check if this error is recoverable (should be retried)
    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    /// Get the inner error
    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    /// Consume self and return the inner error
    pub fn into_inner(self) -> anyhow::Error {
        self.inner
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for TaskError {
    /// Untyped failures default to recoverable
    fn from(err: anyhow::Error) -> Self {
        Self::recoverable(err)
    }
}

impl From<AppError> for TaskError {
    fn from(err: AppError) -> Self {
        if err.is_recoverable() {
            Self::recoverable(err)
        } else {
            Self::unrecoverable(err)
        }
    }
}

/// Extension trait for Result to easily create unrecoverable task errors
pub trait TaskResultExt<T> {
    /// Mark this result as unrecoverable on error
    fn unrecoverable(self) -> Result<T, TaskError>;
}

impl<T, E: Into<anyhow::Error>> TaskResultExt<T> for Result<T, E> {
    fn unrecoverable(self) -> Result<T, TaskError> {
        self.map_err(|e| TaskError::unrecoverable(e.into()))
    }
}
