use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Retry behavior for calls to the remote table service.
///
/// Transient failures are retried with exponential backoff until `max_attempts` calls have been
/// made. The delay before attempt `n + 1` is `initial_delay_ms * backoff_multiplier^(n - 1)`,
/// capped at `max_delay_ms`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Total number of calls made before giving up, including the first one.
    ///
    /// Default: 5
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry.
    ///
    /// Default: 1000ms
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound on the delay between two attempts.
    ///
    /// Default: 30000ms
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Default: 2.0
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_attempts == 0 {
            return Err(ValidationError::RetryMaxAttemptsZero);
        }

        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(ValidationError::BackoffMultiplierTooSmall(
                self.backoff_multiplier,
            ));
        }

        if self.initial_delay_ms > self.max_delay_ms {
            return Err(ValidationError::InitialDelayAboveMax {
                initial: self.initial_delay_ms,
                max: self.max_delay_ms,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: RetryConfig = serde_json::from_str(r#"{"max_attempts": 3}"#).unwrap();

        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_delay(), Duration::from_secs(1));
        assert_eq!(config.max_delay(), Duration::from_secs(30));
        assert_eq!(config.backoff_multiplier, 2.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_attempts() {
        let config = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };

        assert_eq!(
            config.validate(),
            Err(ValidationError::RetryMaxAttemptsZero)
        );
    }

    #[test]
    fn rejects_shrinking_backoff() {
        let config = RetryConfig {
            backoff_multiplier: 0.5,
            ..RetryConfig::default()
        };

        assert_eq!(
            config.validate(),
            Err(ValidationError::BackoffMultiplierTooSmall(0.5))
        );
    }

    #[test]
    fn rejects_non_finite_backoff() {
        for multiplier in [f64::NAN, f64::INFINITY] {
            let config = RetryConfig {
                backoff_multiplier: multiplier,
                ..RetryConfig::default()
            };

            assert!(matches!(
                config.validate(),
                Err(ValidationError::BackoffMultiplierTooSmall(_))
            ));
        }
    }

    #[test]
    fn rejects_initial_delay_above_max() {
        let config = RetryConfig {
            initial_delay_ms: 10_000,
            max_delay_ms: 500,
            ..RetryConfig::default()
        };

        assert_eq!(
            config.validate(),
            Err(ValidationError::InitialDelayAboveMax {
                initial: 10_000,
                max: 500
            })
        );
    }
}
