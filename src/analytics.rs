//! Recovery Analytics
//!
//! Process-lifetime aggregates over every recovery an orchestrator runs:
//! - Overall totals, success rate and mean recovery time
//! - Per action-kind performance
//! - Per error-type patterns feeding predictive suggestions
//! - Circuit breaker trips and prediction accuracy
//!
//! Averages are cumulative means over successful recoveries; the recovery
//! time measured is the duration of the winning action.

use crate::catalog::{ActionKind, RecoveryStrategy};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Weight kept from the previous pattern success rate on each update.
const EWMA_DECAY: f64 = 0.9;

/// Performance of one kind of action across all strategies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyPerformance {
    pub attempts: u64,
    pub successes: u64,
    /// Mean action duration over all attempts (ms)
    pub average_time_ms: f64,
    pub success_rate: f64,
}

/// What has been learned about one error type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorPattern {
    /// Finished recoveries (successful or exhausted) of this type
    pub frequency: u64,
    pub successes: u64,
    /// Mean winning-action duration (ms)
    pub average_recovery_time_ms: f64,
    pub best_strategy: Option<String>,
    /// Seed success rate of `best_strategy` when it was chosen
    pub best_strategy_score: f64,
    /// EWMA biased toward recent outcomes
    pub success_rate: f64,
}

/// Aggregate analytics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryAnalytics {
    pub total_recoveries: u64,
    pub successful_recoveries: u64,
    pub average_recovery_time_ms: f64,
    pub success_rate: f64,
    pub strategy_performance: BTreeMap<ActionKind, StrategyPerformance>,
    pub error_patterns: BTreeMap<String, ErrorPattern>,
    /// Share of finished recoveries whose winning strategy was the top suggestion
    pub predictive_accuracy: f64,
    pub predictions_evaluated: u64,
    pub predictions_correct: u64,
    pub circuit_breaker_events: u64,
}

fn running_mean(old: f64, count: u64, sample: f64) -> f64 {
    if count == 0 {
        return sample;
    }
    (old * (count - 1) as f64 + sample) / count as f64
}

/// Thread-safe owner of a [`RecoveryAnalytics`] aggregate.
#[derive(Debug, Default)]
pub struct AnalyticsAggregator {
    inner: Mutex<RecoveryAnalytics>,
}

impl AnalyticsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_initiated(&self) {
        let mut a = self.inner.lock();
        a.total_recoveries += 1;
        a.success_rate = a.successful_recoveries as f64 / a.total_recoveries as f64;
    }

    /// Record one executed action, successful or not.
    pub fn record_action(&self, kind: ActionKind, success: bool, duration: Duration) {
        let mut a = self.inner.lock();
        let perf = a.strategy_performance.entry(kind).or_default();
        perf.attempts += 1;
        if success {
            perf.successes += 1;
        }
        perf.average_time_ms =
            running_mean(perf.average_time_ms, perf.attempts, duration.as_secs_f64() * 1000.0);
        perf.success_rate = perf.successes as f64 / perf.attempts as f64;
    }

    /// Record a recovery that ended in success.
    pub fn record_success(&self, error_type: &str, strategy: &RecoveryStrategy, duration: Duration) {
        let ms = duration.as_secs_f64() * 1000.0;
        let mut a = self.inner.lock();

        a.successful_recoveries += 1;
        // recoveries initiated before a reset can still finish afterwards
        a.total_recoveries = a.total_recoveries.max(a.successful_recoveries);
        a.average_recovery_time_ms =
            running_mean(a.average_recovery_time_ms, a.successful_recoveries, ms);
        a.success_rate = a.successful_recoveries as f64 / a.total_recoveries as f64;

        let pattern = a.error_patterns.entry(error_type.to_string()).or_insert_with(|| {
            ErrorPattern {
                success_rate: 1.0,
                ..Default::default()
            }
        });
        let first = pattern.frequency == 0;
        pattern.frequency += 1;
        pattern.successes += 1;
        pattern.average_recovery_time_ms =
            running_mean(pattern.average_recovery_time_ms, pattern.successes, ms);
        if !first {
            pattern.success_rate = pattern.success_rate * EWMA_DECAY + (1.0 - EWMA_DECAY);
        }
        if pattern.best_strategy.is_none() || strategy.success_rate > pattern.best_strategy_score {
            pattern.best_strategy = Some(strategy.id.clone());
            pattern.best_strategy_score = strategy.success_rate;
        }

        debug!(
            error_type,
            strategy = %strategy.id,
            pattern_rate = pattern.success_rate,
            "Recorded successful recovery"
        );
    }

    /// Record a recovery that ran out of strategies and attempts.
    pub fn record_exhausted(&self, error_type: &str) {
        let mut a = self.inner.lock();
        let pattern = a.error_patterns.entry(error_type.to_string()).or_default();
        let first = pattern.frequency == 0;
        pattern.frequency += 1;
        if !first {
            pattern.success_rate *= EWMA_DECAY;
        }
    }

    pub fn record_breaker_trip(&self) {
        self.inner.lock().circuit_breaker_events += 1;
    }

    /// Record whether the top suggestion made at initiation was the
    /// strategy that finally recovered.
    pub fn record_prediction(&self, correct: bool) {
        let mut a = self.inner.lock();
        a.predictions_evaluated += 1;
        if correct {
            a.predictions_correct += 1;
        }
        a.predictive_accuracy = a.predictions_correct as f64 / a.predictions_evaluated as f64;
    }

    pub fn pattern(&self, error_type: &str) -> Option<ErrorPattern> {
        self.inner.lock().error_patterns.get(error_type).cloned()
    }

    pub fn snapshot(&self) -> RecoveryAnalytics {
        self.inner.lock().clone()
    }

    pub fn reset(&self) {
        *self.inner.lock() = RecoveryAnalytics::default();
    }
}
