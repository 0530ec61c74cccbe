//! Circuit breakers keyed by `(error type, strategy)`
//!
//! Each key gets its own breaker the first time a failure is observed for it.
//! Open breakers are moved to half-open lazily, on the next gate check after
//! their cool-down has elapsed.

use crate::config::OrchestratorConfig;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,   // Normal operation
    Open,     // Failing, rejecting attempts
    HalfOpen, // Letting a probe through
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Snapshot of a single breaker, suitable for status badges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub state: CircuitState,
    /// Consecutive failures since the last success
    pub failures: u32,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub next_attempt_time: Option<DateTime<Utc>>,
    pub timeout_ms: u64,
    pub threshold: u32,
    /// Monotonic deadline backing `next_attempt_time`
    #[serde(skip)]
    reopen_at: Option<Instant>,
}

impl CircuitBreakerState {
    fn new(policy: &BreakerPolicy) -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            last_failure_time: None,
            next_attempt_time: None,
            timeout_ms: policy.timeout.as_millis() as u64,
            threshold: policy.threshold,
            reopen_at: None,
        }
    }

    fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.failures = 0;
        self.next_attempt_time = None;
        self.reopen_at = None;
    }
}

/// Breaker settings derived from the orchestrator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerPolicy {
    pub enabled: bool,
    pub threshold: u32,
    pub timeout: Duration,
}

impl BreakerPolicy {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            enabled: config.enable_circuit_breaker,
            threshold: config.circuit_breaker_threshold,
            timeout: config.circuit_breaker_timeout(),
        }
    }
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self::from_config(&OrchestratorConfig::default())
    }
}

/// Owns every breaker for one orchestrator.
#[derive(Debug, Default)]
pub struct CircuitBreakerManager {
    breakers: Mutex<HashMap<String, CircuitBreakerState>>,
}

impl CircuitBreakerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Breaker key for an error type and strategy id.
    pub fn key(error_type: &str, strategy_id: &str) -> String {
        format!("{}:{}", error_type, strategy_id)
    }

    /// Returns `false` when the breaker for `key` is open and still cooling
    /// down. An open breaker whose cool-down has elapsed becomes half-open.
    pub fn check_gate(&self, key: &str, policy: &BreakerPolicy) -> bool {
        if !policy.enabled {
            return true;
        }

        let mut breakers = self.breakers.lock();
        let Some(breaker) = breakers.get_mut(key) else {
            return true;
        };

        match breaker.state {
            CircuitState::Open => {
                let cooled_down = breaker
                    .reopen_at
                    .map(|at| Instant::now() >= at)
                    .unwrap_or(true);
                if cooled_down {
                    breaker.state = CircuitState::HalfOpen;
                    info!(key, "Circuit breaker half-open, allowing probe");
                    true
                } else {
                    warn!(key, failures = breaker.failures, "Circuit breaker open, blocking attempt");
                    false
                }
            }
            CircuitState::Closed | CircuitState::HalfOpen => true,
        }
    }

    /// Record the outcome of an action executed under `key`.
    ///
    /// Returns `true` when this failure moved the breaker into `Open`.
    pub fn update_outcome(&self, key: &str, success: bool, policy: &BreakerPolicy) -> bool {
        if !policy.enabled {
            return false;
        }

        let mut breakers = self.breakers.lock();

        if success {
            if let Some(breaker) = breakers.get_mut(key) {
                if breaker.state != CircuitState::Closed {
                    info!(key, from = %breaker.state, "Circuit breaker closing after success");
                }
                breaker.reset();
            }
            return false;
        }

        let breaker = breakers
            .entry(key.to_string())
            .or_insert_with(|| CircuitBreakerState::new(policy));
        breaker.threshold = policy.threshold;
        breaker.timeout_ms = policy.timeout.as_millis() as u64;
        breaker.failures += 1;
        debug!(key, failures = breaker.failures, "Circuit breaker failure recorded");

        if breaker.failures < breaker.threshold {
            return false;
        }

        let was_open = breaker.state == CircuitState::Open;
        let now = Utc::now();
        breaker.state = CircuitState::Open;
        breaker.last_failure_time = Some(now);
        breaker.next_attempt_time = chrono::Duration::from_std(policy.timeout)
            .ok()
            .and_then(|d| now.checked_add_signed(d));
        breaker.reopen_at = Some(Instant::now() + policy.timeout);

        if !was_open {
            warn!(
                key,
                failures = breaker.failures,
                timeout_ms = breaker.timeout_ms,
                "Circuit breaker opened"
            );
        }
        !was_open
    }

    /// Snapshot of the breaker for `key`, if one exists.
    pub fn state(&self, key: &str) -> Option<CircuitBreakerState> {
        self.breakers.lock().get(key).cloned()
    }

    /// Snapshot of every breaker.
    pub fn all(&self) -> HashMap<String, CircuitBreakerState> {
        self.breakers.lock().clone()
    }

    pub fn clear(&self) {
        self.breakers.lock().clear();
    }
}
