use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Controls how long the exporter waits on asynchronous jobs of the remote table service.
///
/// A job that is still pending after `max_attempts` polls is reported as timed out.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct JobPollConfig {
    /// Delay between two consecutive polls of the same job.
    #[serde(default = "JobPollConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum number of polls before the job is considered timed out.
    #[serde(default = "JobPollConfig::default_max_attempts")]
    pub max_attempts: u32,
}

impl JobPollConfig {
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

    pub const DEFAULT_MAX_ATTEMPTS: u32 = 300;

    fn default_poll_interval_ms() -> u64 {
        Self::DEFAULT_POLL_INTERVAL_MS
    }

    fn default_max_attempts() -> u32 {
        Self::DEFAULT_MAX_ATTEMPTS
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_attempts == 0 {
            return Err(ValidationError::JobPollMaxAttemptsZero);
        }

        Ok(())
    }
}

impl Default for JobPollConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: Self::DEFAULT_POLL_INTERVAL_MS,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
        }
    }
}
