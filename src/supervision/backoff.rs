//! Retry delay calculation

use crate::config::OrchestratorConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay policy between successive recovery attempts.
///
/// With exponential backoff enabled the delay for attempt `n` (1-based) is
/// `base * 2^(n-1)`, capped at `max`. Otherwise every attempt waits `base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub exponential: bool,
}

impl BackoffPolicy {
    pub fn exponential(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            exponential: true,
        }
    }

    pub fn fixed(delay: Duration) -> Self {
        Self {
            base: delay,
            max: delay,
            exponential: false,
        }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            base: config.base_retry_delay(),
            max: config.max_retry_delay(),
            exponential: config.exponential_backoff,
        }
    }

    /// Delay before retry number `attempt`. Attempt 0 is treated as 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        if !self.exponential {
            return self.base;
        }

        let base_ms = self.base.as_millis().min(u64::MAX as u128) as u64;
        let factor = 1u64
            .checked_shl(attempt.max(1) - 1)
            .unwrap_or(u64::MAX);
        let delay = Duration::from_millis(base_ms.saturating_mul(factor));
        delay.min(self.max)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&OrchestratorConfig::default())
    }
}
