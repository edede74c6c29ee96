use serde::{Deserialize, Serialize};

use crate::Config;
use crate::shared::{ColumnWidthConfig, JobPollConfig, RetryConfig, TsvConfig, ValidationError};

/// Complete configuration of the table exporter.
///
/// Every section is optional in the configuration files and falls back to its defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExporterConfig {
    /// Retry policy applied to every call made to the remote table service.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Polling of asynchronous table transactions and bulk uploads.
    #[serde(default)]
    pub job_poll: JobPollConfig,
    #[serde(default)]
    pub column_widths: ColumnWidthConfig,
    #[serde(default)]
    pub tsv: TsvConfig,
}

impl ExporterConfig {
    /// Validates every section of the configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.retry.validate()?;
        self.job_poll.validate()?;
        self.column_widths.validate()
    }
}

impl Config for ExporterConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}
