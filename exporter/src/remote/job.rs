//! Asynchronous jobs of the remote table service.
//!
//! A job is submitted once and then polled until it yields a result. Polls that find the job still
//! running return [`PollOutcome::Pending`], which is not an error and is never retried by the
//! retry policy. [`wait_for_job`] drives the poll loop under an attempt budget.

use std::fmt;
use std::future::Future;

use config::shared::JobPollConfig;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::bail;
use crate::error::{ErrorKind, ExportResult};

/// Kind of asynchronous job, used for logging and error details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    TableTransaction,
    TsvUpload,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::TableTransaction => f.write_str("table transaction"),
            JobKind::TsvUpload => f.write_str("tsv upload"),
        }
    }
}

/// Opaque token of a submitted job together with the table it targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    kind: JobKind,
    token: String,
    table_id: String,
}

impl JobHandle {
    pub fn new(kind: JobKind, token: impl Into<String>, table_id: impl Into<String>) -> Self {
        Self {
            kind,
            token: token.into(),
            table_id: table_id.into(),
        }
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn table_id(&self) -> &str {
        &self.table_id
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} on table {}", self.kind, self.token, self.table_id)
    }
}

/// Result of polling a job once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The job is still running.
    Pending,
    /// The job finished and produced a result.
    Ready(T),
}

impl<T> PollOutcome<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, PollOutcome::Pending)
    }

    /// Converts into an [`Option`], mapping [`PollOutcome::Pending`] to `None`.
    pub fn ready(self) -> Option<T> {
        match self {
            PollOutcome::Pending => None,
            PollOutcome::Ready(value) => Some(value),
        }
    }
}

/// Polls `handle` until the job is ready, a poll fails, or the budget of `config` is spent.
///
/// Waits `config.poll_interval()` between two polls. A job still pending after
/// `config.max_attempts` polls fails with [`ErrorKind::RemoteJobTimeout`].
pub async fn wait_for_job<T, F, Fut>(
    handle: &JobHandle,
    config: &JobPollConfig,
    mut poll: F,
) -> ExportResult<T>
where
    F: FnMut(&JobHandle) -> Fut,
    Fut: Future<Output = ExportResult<PollOutcome<T>>>,
{
    for attempt in 1..=config.max_attempts {
        match poll(handle).await? {
            PollOutcome::Ready(result) => {
                info!(job = %handle, polls = attempt, "remote job finished");
                return Ok(result);
            }
            PollOutcome::Pending => {
                debug!(job = %handle, attempt, "remote job still pending");
            }
        }

        if attempt < config.max_attempts {
            sleep(config.poll_interval()).await;
        }
    }

    warn!(
        job = %handle,
        max_attempts = config.max_attempts,
        "remote job did not finish within the poll budget"
    );
    bail!(
        ErrorKind::RemoteJobTimeout,
        "Remote job did not finish in time",
        format!(
            "{handle} still pending after {} polls",
            config.max_attempts
        )
    );
}
