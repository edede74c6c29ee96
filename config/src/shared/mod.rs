//! Shared configuration types for table exports.

mod base;
mod column_width;
mod exporter;
mod job_poll;
mod retry;
mod tsv;

pub use base::ValidationError;
pub use column_width::ColumnWidthConfig;
pub use exporter::ExporterConfig;
pub use job_poll::JobPollConfig;
pub use retry::RetryConfig;
pub use tsv::TsvConfig;
