use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Retry attempts cannot be zero, the first call counts as an attempt.
    #[error("`retry.max_attempts` cannot be zero")]
    RetryMaxAttemptsZero,
    /// Backoff must not shrink between attempts.
    #[error("`retry.backoff_multiplier` must be a finite value >= 1.0, got {0}")]
    BackoffMultiplierTooSmall(f64),
    #[error("`retry.initial_delay_ms` ({initial}) cannot exceed `retry.max_delay_ms` ({max})")]
    InitialDelayAboveMax { initial: u64, max: u64 },
    #[error("`job_poll.max_attempts` cannot be zero")]
    JobPollMaxAttemptsZero,
    /// A column width override must leave room for at least one character.
    #[error("column width override for `{0}` cannot be zero")]
    ColumnWidthZero(String),
}
