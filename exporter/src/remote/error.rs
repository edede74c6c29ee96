use thiserror::Error;

use crate::error::{ErrorKind, ExportError};
use crate::export_error;

/// Failure reported by the remote table service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The asynchronous job has not finished yet. Expected while polling, never a fault.
    #[error("result not ready")]
    NotReady,

    /// The request never reached the service or the connection dropped.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("too many requests: {0}")]
    Throttled(String),

    /// The service is in read-only mode and rejects writes.
    #[error("service is read-only: {0}")]
    ReadOnly(String),

    #[error("internal server error: {0}")]
    Server(String),

    /// The request conflicts with the current state, for example a duplicate name or a stale etag.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The asynchronous job finished with an error.
    #[error("job failed: {0}")]
    JobFailed(String),
}

impl RemoteError {
    /// Returns the [`ErrorKind`] this failure is reported as.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RemoteError::Transport(_) | RemoteError::Unavailable(_) => {
                ErrorKind::RemoteServiceUnavailable
            }
            RemoteError::Throttled(_) => ErrorKind::RemoteRateLimited,
            RemoteError::ReadOnly(_) => ErrorKind::RemoteServiceReadOnly,
            RemoteError::Server(_) => ErrorKind::RemoteServiceError,
            RemoteError::Conflict(_) => ErrorKind::RemoteConflict,
            RemoteError::BadRequest(_) => ErrorKind::RemoteInvalidRequest,
            RemoteError::NotFound(_) => ErrorKind::RemoteNotFound,
            RemoteError::Forbidden(_) | RemoteError::Unauthorized(_) => {
                ErrorKind::RemotePermissionDenied
            }
            RemoteError::JobFailed(_) => ErrorKind::RemoteJobFailed,
            // Reaching this means a poll result escaped the job poller.
            RemoteError::NotReady => ErrorKind::InvalidState,
        }
    }
}

/// Default retry classification of remote failures.
///
/// Only transient conditions are retried: transport failures, unavailability, throttling, read-only
/// windows and internal server errors. Validation, conflict, permission and missing-entity errors
/// fail immediately. [`RemoteError::NotReady`] is not a failure and is never retried here.
pub fn is_retryable_remote_error(error: &RemoteError) -> bool {
    match error {
        RemoteError::Transport(_)
        | RemoteError::Unavailable(_)
        | RemoteError::Throttled(_)
        | RemoteError::ReadOnly(_)
        | RemoteError::Server(_) => true,

        RemoteError::NotReady
        | RemoteError::Conflict(_)
        | RemoteError::BadRequest(_)
        | RemoteError::NotFound(_)
        | RemoteError::Forbidden(_)
        | RemoteError::Unauthorized(_)
        | RemoteError::JobFailed(_) => false,
    }
}

impl From<RemoteError> for ExportError {
    #[track_caller]
    fn from(err: RemoteError) -> ExportError {
        export_error!(
            err.kind(),
            "Remote table service call failed",
            err.to_string(),
            source: err
        )
    }
}
