//! Configuration types shared across crates

use crate::error::{DeskResult, ValidationError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry configuration for remote status polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Consecutive failures tolerated before giving up.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Backoff before retry number `attempt` (1-based), capped at `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let factor = f64::from(self.backoff_multiplier).powi(exponent);
        let millis = self.initial_backoff.as_millis() as f64 * factor;
        let max_millis = self.max_backoff.as_millis() as f64;
        Duration::from_millis(millis.min(max_millis) as u64)
    }

    pub fn validate(&self) -> DeskResult<()> {
        if self.initial_backoff.is_zero() {
            return Err(ValidationError::InvalidValue {
                field: "initial_backoff".to_string(),
                reason: "must be > 0".to_string(),
            }
            .into());
        }
        if self.max_backoff < self.initial_backoff {
            return Err(ValidationError::InvalidValue {
                field: "max_backoff".to_string(),
                reason: "must be >= initial_backoff".to_string(),
            }
            .into());
        }
        if self.backoff_multiplier < 1.0 {
            return Err(ValidationError::InvalidValue {
                field: "backoff_multiplier".to_string(),
                reason: "must be >= 1.0".to_string(),
            }
            .into());
        }
        Ok(())
    }
}
