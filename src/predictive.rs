//! Predictive strategy suggestions from historical error patterns

use crate::analytics::ErrorPattern;
use serde::{Deserialize, Serialize};

/// A strategy recommendation derived from past recoveries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictiveSuggestion {
    /// Strategy id
    pub strategy: String,
    pub confidence: f64,
    pub reasoning: String,
    pub expected_success_rate: f64,
    /// Estimated recovery time (ms)
    pub estimated_recovery_time_ms: f64,
}

/// Suggestion settings derived from the orchestrator configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictivePolicy {
    pub enabled: bool,
    pub threshold: f64,
}

/// Suggestions for an error type given its recorded pattern.
///
/// Yields at most one suggestion, and none when prediction is disabled, no
/// pattern or best strategy is known, or the confidence is below threshold.
pub fn suggestions(pattern: Option<&ErrorPattern>, policy: PredictivePolicy) -> Vec<PredictiveSuggestion> {
    if !policy.enabled {
        return Vec::new();
    }
    let Some(pattern) = pattern else {
        return Vec::new();
    };
    let Some(strategy) = pattern.best_strategy.clone() else {
        return Vec::new();
    };

    let confidence = pattern.success_rate;
    if confidence < policy.threshold {
        return Vec::new();
    }

    vec![PredictiveSuggestion {
        strategy,
        confidence,
        reasoning: format!("based on {} previous occurrences", pattern.frequency),
        expected_success_rate: pattern.success_rate,
        estimated_recovery_time_ms: pattern.average_recovery_time_ms,
    }]
}
