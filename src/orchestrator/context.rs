//! Per-recovery state

use crate::catalog::{RaisedError, RecoverableErrorKind, RecoveryStrategy, Severity};
use crate::observability::AttemptMetrics;
use crate::predictive::PredictiveSuggestion;
use crate::supervision::CircuitBreakerState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Where a recovery currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPhase {
    /// Created, not executed yet
    Initiated,
    Executing,
    /// A fallback strategy is waiting on its backoff timer
    RetryScheduled,
    /// The circuit breaker refused the last attempt; execute again later
    Blocked,
    /// All strategies and attempts used up
    Exhausted,
    Succeeded,
    Cancelled,
}

impl RecoveryPhase {
    /// Nothing is running or pending for the recovery.
    pub fn is_settled(&self) -> bool {
        !matches!(self, RecoveryPhase::Executing | RecoveryPhase::RetryScheduled)
    }

    /// The recovery no longer lives in the active set.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RecoveryPhase::Succeeded | RecoveryPhase::Cancelled)
    }
}

impl std::fmt::Display for RecoveryPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecoveryPhase::Initiated => "initiated",
            RecoveryPhase::Executing => "executing",
            RecoveryPhase::RetryScheduled => "retry_scheduled",
            RecoveryPhase::Blocked => "blocked",
            RecoveryPhase::Exhausted => "exhausted",
            RecoveryPhase::Succeeded => "succeeded",
            RecoveryPhase::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Record of one executed action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryAttempt {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub strategy_id: String,
    pub action_id: String,
    pub success: bool,
    pub duration_ms: u64,
    /// Failure description, `None` on success
    pub error: Option<String>,
    pub timed_out: bool,
    pub metrics: AttemptMetrics,
}

/// Pending fallback retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledRetry {
    pub strategy_id: String,
    pub delay_ms: u64,
    pub due_at: DateTime<Utc>,
}

/// Everything known about one in-flight recovery.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryContext {
    pub error_id: String,
    pub error_type: String,
    pub message: String,
    pub kind: Option<RecoverableErrorKind>,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    /// Strategy executions that passed the circuit breaker gate
    pub attempts: u32,
    /// Candidate strategies in the order they will be tried
    pub strategies: Vec<Arc<RecoveryStrategy>>,
    pub current_strategy: Option<Arc<RecoveryStrategy>>,
    pub history: Vec<RecoveryAttempt>,
    pub circuit_breaker_state: Option<CircuitBreakerState>,
    /// Suggestions captured at initiation
    pub predictive_suggestions: Vec<PredictiveSuggestion>,
    pub phase: RecoveryPhase,
    pub scheduled_retry: Option<ScheduledRetry>,
    /// Opaque caller data
    pub context: serde_json::Value,
}

impl RecoveryContext {
    pub(crate) fn new(
        error_id: String,
        error: RaisedError,
        strategies: Vec<Arc<RecoveryStrategy>>,
        predictive_suggestions: Vec<PredictiveSuggestion>,
        context: serde_json::Value,
    ) -> Self {
        Self {
            error_id,
            error_type: error.type_name,
            message: error.message,
            kind: error.kind,
            severity: error.severity,
            timestamp: Utc::now(),
            attempts: 0,
            strategies,
            current_strategy: None,
            history: Vec::new(),
            circuit_breaker_state: None,
            predictive_suggestions,
            phase: RecoveryPhase::Initiated,
            scheduled_retry: None,
            context,
        }
    }

    pub fn last_attempt(&self) -> Option<&RecoveryAttempt> {
        self.history.last()
    }
}
