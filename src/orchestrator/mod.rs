//! Recovery Orchestrator
//!
//! Drives each raised error through its candidate strategies.
//!
//! ```text
//! initiate_recovery ──► select strategies ──► RecoveryContext (Initiated)
//!                                                   │
//! execute_recovery ──► breaker gate ──► actions in order ──► success ──► Succeeded
//!                          │                    │                        (removed)
//!                     open: Blocked         all failed
//!                                               │
//!                      fallback and attempts left? ──yes──► backoff timer
//!                                               │ no              │
//!                                           Exhausted    execute_recovery(fallback)
//! ```
//!
//! Every orchestrator is an independent instance; clones share state.

pub mod context;
pub mod scheduler;
pub mod timeout;

pub use context::{RecoveryAttempt, RecoveryContext, RecoveryPhase, ScheduledRetry};
pub use scheduler::{CancellationHandle, Scheduler, TokioScheduler};
pub use timeout::{run_action, ActionOutcome};

use crate::analytics::{AnalyticsAggregator, RecoveryAnalytics};
use crate::catalog::{CachePolicy, RaisedError, RecoveryStrategy, StrategyCatalog};
use crate::config::{ConfigPatch, OrchestratorConfig};
use crate::errors::{RecoveryError, Result};
use crate::observability::telemetry::sanitize_for_log;
use crate::observability::{MetricsProbe, SystemMetricsProbe};
use crate::predictive::{self, PredictivePolicy, PredictiveSuggestion};
use crate::supervision::{BackoffPolicy, BreakerPolicy, CircuitBreakerManager, CircuitBreakerState};
use chrono::Utc;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Finished recoveries remembered for [`RecoveryOrchestrator::phase`].
const RECENT_OUTCOMES: usize = 256;

struct PendingRetry {
    token: u64,
    handle: CancellationHandle,
}

struct Inner {
    config: RwLock<OrchestratorConfig>,
    catalog: StrategyCatalog,
    breakers: CircuitBreakerManager,
    analytics: AnalyticsAggregator,
    contexts: Mutex<HashMap<String, RecoveryContext>>,
    timers: Mutex<HashMap<String, PendingRetry>>,
    outcomes: Mutex<VecDeque<(String, RecoveryPhase)>>,
    scheduler: Arc<dyn Scheduler>,
    metrics_probe: Arc<dyn MetricsProbe>,
    next_token: AtomicU64,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for (_, pending) in self.timers.get_mut().drain() {
            pending.handle.cancel();
        }
    }
}

/// Builder for [`RecoveryOrchestrator`]
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    catalog: Option<StrategyCatalog>,
    scheduler: Option<Arc<dyn Scheduler>>,
    metrics_probe: Option<Arc<dyn MetricsProbe>>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: OrchestratorConfig::default(),
            catalog: None,
            scheduler: None,
            metrics_probe: None,
        }
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn catalog(mut self, catalog: StrategyCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn metrics_probe(mut self, probe: Arc<dyn MetricsProbe>) -> Self {
        self.metrics_probe = Some(probe);
        self
    }

    pub fn build(self) -> Result<RecoveryOrchestrator> {
        self.config.validate()?;

        let inner = Inner {
            config: RwLock::new(self.config),
            catalog: self.catalog.unwrap_or_default(),
            breakers: CircuitBreakerManager::new(),
            analytics: AnalyticsAggregator::new(),
            contexts: Mutex::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
            outcomes: Mutex::new(VecDeque::new()),
            scheduler: self.scheduler.unwrap_or_else(|| Arc::new(TokioScheduler)),
            metrics_probe: self
                .metrics_probe
                .unwrap_or_else(|| Arc::new(SystemMetricsProbe::new())),
            next_token: AtomicU64::new(1),
        };

        Ok(RecoveryOrchestrator {
            inner: Arc::new(inner),
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to an error recovery orchestrator. Cheap to clone.
#[derive(Clone)]
pub struct RecoveryOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RecoveryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryOrchestrator")
            .field("strategies", &self.inner.catalog.len())
            .field("active", &self.inner.contexts.lock().len())
            .finish_non_exhaustive()
    }
}

impl RecoveryOrchestrator {
    pub fn new(config: OrchestratorConfig, catalog: StrategyCatalog) -> Result<Self> {
        OrchestratorBuilder::new().config(config).catalog(catalog).build()
    }

    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    // ========================================================================
    // Recovery lifecycle
    // ========================================================================

    /// Register `error` for recovery and return its recovery id.
    ///
    /// Selects candidate strategies and captures predictive suggestions; no
    /// action is executed.
    pub fn initiate_recovery(&self, error: RaisedError, context: serde_json::Value) -> String {
        let config = self.config();

        let mut strategies = self.inner.catalog.select(
            &error,
            CachePolicy {
                enabled: config.enable_recovery_cache,
                capacity: config.recovery_cache_size,
            },
        );
        let suggestions = self.recovery_suggestions(&error.type_name, &context);

        if config.enable_intelligent_retry {
            if let Some(top) = suggestions.first() {
                if let Some(index) = strategies.iter().position(|s| s.id == top.strategy) {
                    let promoted = strategies.remove(index);
                    strategies.insert(0, promoted);
                }
            }
        }

        let recovery_id = format!("recovery_{}", Uuid::new_v4().simple());
        info!(
            recovery_id = %recovery_id,
            error_type = %sanitize_for_log(&error.type_name),
            candidates = strategies.len(),
            suggestions = suggestions.len(),
            "Recovery initiated"
        );

        let ctx = RecoveryContext::new(recovery_id.clone(), error, strategies, suggestions, context);
        self.inner.contexts.lock().insert(recovery_id.clone(), ctx);

        if config.enable_recovery_analytics {
            self.inner.analytics.record_initiated();
        }
        recovery_id
    }

    /// Execute one strategy for a recovery.
    ///
    /// Uses `strategy_id` from the catalog when given, otherwise the first
    /// candidate. Returns `Ok(true)` when an action recovered the error and
    /// `Ok(false)` when the breaker refused the attempt, the strategy could not
    /// be resolved, every action failed, a fallback retry was scheduled, or
    /// the recovery was cancelled while its action ran.
    ///
    /// Dropping the returned future mid-action puts the recovery back in the
    /// phase it was executed from, so it can be executed again.
    pub async fn execute_recovery(&self, recovery_id: &str, strategy_id: Option<&str>) -> Result<bool> {
        let config = self.config();
        let breaker_policy = BreakerPolicy::from_config(&config);
        let analytics_enabled = config.enable_recovery_analytics;

        let Some((error_type, strategy)) = self.resolve(recovery_id, strategy_id, analytics_enabled)? else {
            return Ok(false);
        };

        let key = CircuitBreakerManager::key(&error_type, &strategy.id);
        let allowed = self.inner.breakers.check_gate(&key, &breaker_policy);
        let resumed_phase = {
            let mut contexts = self.inner.contexts.lock();
            let Some(ctx) = contexts.get_mut(recovery_id) else {
                return Ok(false);
            };
            ctx.circuit_breaker_state = self.inner.breakers.state(&key);
            ctx.scheduled_retry = None;
            if !allowed {
                ctx.phase = RecoveryPhase::Blocked;
                info!(recovery_id, strategy = %strategy.id, "Recovery attempt refused by circuit breaker");
                return Ok(false);
            }
            let resumed_phase = match ctx.phase {
                RecoveryPhase::RetryScheduled => RecoveryPhase::Initiated,
                other => other,
            };
            ctx.attempts += 1;
            ctx.current_strategy = Some(Arc::clone(&strategy));
            ctx.phase = RecoveryPhase::Executing;
            info!(
                recovery_id,
                strategy = %strategy.id,
                attempt = ctx.attempts,
                "Executing recovery strategy"
            );
            resumed_phase
        };
        let mut abandon = AbandonGuard {
            inner: &self.inner,
            recovery_id,
            resumed_phase,
            armed: true,
        };

        for action in &strategy.actions {
            let active = self.inner.contexts.lock().contains_key(recovery_id);
            if !active {
                debug!(recovery_id, "Recovery cancelled during execution");
                return Ok(false);
            }

            let outcome = run_action(action).await;
            let success = outcome.is_success();

            if self.inner.breakers.update_outcome(&key, success, &breaker_policy) && analytics_enabled {
                self.inner.analytics.record_breaker_trip();
            }
            if analytics_enabled {
                self.inner.analytics.record_action(action.kind, success, outcome.duration);
            }

            let attempt = RecoveryAttempt {
                id: Uuid::new_v4().to_string(),
                timestamp: Utc::now(),
                strategy_id: strategy.id.clone(),
                action_id: action.id.clone(),
                success,
                duration_ms: outcome.duration.as_millis() as u64,
                error: outcome.result.as_ref().err().map(|f| f.to_string()),
                timed_out: matches!(&outcome.result, Err(f) if f.is_timeout()),
                metrics: self.inner.metrics_probe.sample(outcome.duration),
            };
            {
                let mut contexts = self.inner.contexts.lock();
                if let Some(ctx) = contexts.get_mut(recovery_id) {
                    ctx.history.push(attempt);
                    ctx.circuit_breaker_state = self.inner.breakers.state(&key);
                }
            }

            match outcome.result {
                Ok(()) => {
                    abandon.disarm();
                    return Ok(self.complete(recovery_id, &strategy, outcome.duration, analytics_enabled));
                }
                Err(failure) => {
                    warn!(
                        recovery_id,
                        strategy = %strategy.id,
                        action = %action.id,
                        error = %sanitize_for_log(&failure.to_string()),
                        "Recovery action failed"
                    );
                }
            }
        }

        // a retry scheduled below may start executing before this frame unwinds
        abandon.disarm();
        self.after_failure(recovery_id, &strategy, &config);
        Ok(false)
    }

    /// Initiate and immediately execute a recovery. Returns the recovery id
    /// and the outcome of the first execution.
    pub async fn recover(&self, error: RaisedError, context: serde_json::Value) -> Result<(String, bool)> {
        let recovery_id = self.initiate_recovery(error, context);
        let recovered = self.execute_recovery(&recovery_id, None).await?;
        Ok((recovery_id, recovered))
    }

    /// Abandon a recovery, clearing any pending retry. Returns whether the
    /// recovery was still active; calling it again is a no-op.
    pub fn cancel_recovery(&self, recovery_id: &str) -> bool {
        let pending = self.inner.timers.lock().remove(recovery_id);
        if let Some(pending) = pending {
            pending.handle.cancel();
        }

        let removed = self.inner.contexts.lock().remove(recovery_id);
        match removed {
            Some(ctx) => {
                info!(recovery_id, attempts = ctx.attempts, "Recovery cancelled");
                self.remember_outcome(recovery_id, RecoveryPhase::Cancelled);
                true
            }
            None => false,
        }
    }

    /// Wait until nothing is running or pending for a recovery and return its
    /// phase. `None` when the id was never seen or has been forgotten.
    pub async fn wait_until_settled(&self, recovery_id: &str, poll: Duration) -> Option<RecoveryPhase> {
        loop {
            match self.phase(recovery_id) {
                Some(phase) if !phase.is_settled() => tokio::time::sleep(poll).await,
                other => return other,
            }
        }
    }

    fn resolve(
        &self,
        recovery_id: &str,
        strategy_id: Option<&str>,
        analytics_enabled: bool,
    ) -> Result<Option<(String, Arc<RecoveryStrategy>)>> {
        let mut contexts = self.inner.contexts.lock();
        let ctx = contexts
            .get_mut(recovery_id)
            .ok_or_else(|| RecoveryError::NotFound(recovery_id.to_string()))?;

        if ctx.phase == RecoveryPhase::Executing {
            debug!(recovery_id, "Recovery already executing");
            return Ok(None);
        }

        let strategy = match strategy_id {
            Some(id) => self.inner.catalog.get(id),
            None => ctx.strategies.first().cloned(),
        };

        match strategy {
            Some(strategy) => Ok(Some((ctx.error_type.clone(), strategy))),
            None => {
                if strategy_id.is_none() {
                    warn!(recovery_id, error_type = %ctx.error_type, "No recovery strategy matches error");
                    exhaust(&self.inner.analytics, ctx, analytics_enabled);
                } else {
                    warn!(recovery_id, strategy = ?strategy_id, "Unknown recovery strategy");
                }
                Ok(None)
            }
        }
    }

    fn complete(
        &self,
        recovery_id: &str,
        strategy: &RecoveryStrategy,
        duration: Duration,
        analytics_enabled: bool,
    ) -> bool {
        let pending = self.inner.timers.lock().remove(recovery_id);
        if let Some(pending) = pending {
            pending.handle.cancel();
        }

        let Some(ctx) = self.inner.contexts.lock().remove(recovery_id) else {
            debug!(recovery_id, strategy = %strategy.id, "Recovery cancelled before its action succeeded");
            return false;
        };

        if analytics_enabled {
            self.inner.analytics.record_success(&ctx.error_type, strategy, duration);
            if let Some(top) = ctx.predictive_suggestions.first() {
                self.inner.analytics.record_prediction(top.strategy == strategy.id);
            }
        }
        self.remember_outcome(recovery_id, RecoveryPhase::Succeeded);

        info!(
            recovery_id,
            strategy = %strategy.id,
            attempts = ctx.attempts,
            duration_ms = duration.as_millis() as u64,
            "Recovery succeeded"
        );
        true
    }

    fn after_failure(&self, recovery_id: &str, strategy: &RecoveryStrategy, config: &OrchestratorConfig) {
        let fallback = strategy
            .fallback_strategies
            .first()
            .filter(|id| self.inner.catalog.get(id).is_some())
            .cloned();

        let mut contexts = self.inner.contexts.lock();
        let Some(ctx) = contexts.get_mut(recovery_id) else {
            return;
        };

        match fallback {
            Some(next) if config.enable_fallback_strategies && ctx.attempts < config.max_retry_attempts => {
                let delay = BackoffPolicy::from_config(config).delay(ctx.attempts);
                ctx.phase = RecoveryPhase::RetryScheduled;
                ctx.scheduled_retry = Some(ScheduledRetry {
                    strategy_id: next.clone(),
                    delay_ms: delay.as_millis() as u64,
                    due_at: Utc::now()
                        + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero()),
                });
                info!(
                    recovery_id,
                    failed = %strategy.id,
                    fallback = %next,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling fallback strategy"
                );
                drop(contexts);
                self.schedule_retry(recovery_id, next, delay);
            }
            _ => exhaust(&self.inner.analytics, ctx, config.enable_recovery_analytics),
        }
    }

    fn schedule_retry(&self, recovery_id: &str, strategy_id: String, delay: Duration) {
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        let task = retry_task(
            Arc::downgrade(&self.inner),
            recovery_id.to_string(),
            strategy_id,
            token,
        );

        // the task claims its entry under this lock, so it cannot run ahead of the insert
        let mut timers = self.inner.timers.lock();
        let handle = self.inner.scheduler.schedule_after(delay, task);
        if let Some(previous) = timers.insert(recovery_id.to_string(), PendingRetry { token, handle }) {
            previous.handle.cancel();
        }
    }

    /// Deregister a fired timer. `false` when it was superseded or cancelled.
    fn claim_timer(&self, recovery_id: &str, token: u64) -> bool {
        let mut timers = self.inner.timers.lock();
        match timers.get(recovery_id) {
            Some(pending) if pending.token == token => {
                timers.remove(recovery_id);
                true
            }
            _ => false,
        }
    }

    fn remember_outcome(&self, recovery_id: &str, phase: RecoveryPhase) {
        let mut outcomes = self.inner.outcomes.lock();
        if outcomes.len() >= RECENT_OUTCOMES {
            outcomes.pop_front();
        }
        outcomes.push_back((recovery_id.to_string(), phase));
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Strategy suggestions for an error type from past recoveries.
    pub fn recovery_suggestions(
        &self,
        error_type: &str,
        _context: &serde_json::Value,
    ) -> Vec<PredictiveSuggestion> {
        let config = self.config();
        let pattern = self.inner.analytics.pattern(error_type);
        predictive::suggestions(
            pattern.as_ref(),
            PredictivePolicy {
                enabled: config.enable_predictive_recovery,
                threshold: config.predictive_accuracy_threshold,
            },
        )
    }

    pub fn analytics(&self) -> RecoveryAnalytics {
        self.inner.analytics.snapshot()
    }

    pub fn reset_analytics(&self) {
        self.inner.analytics.reset();
        info!("Recovery analytics reset");
    }

    /// Snapshot of one active (or exhausted) recovery.
    pub fn recovery(&self, recovery_id: &str) -> Option<RecoveryContext> {
        self.inner.contexts.lock().get(recovery_id).cloned()
    }

    /// Active and exhausted recoveries, oldest first.
    pub fn active_recoveries(&self) -> Vec<RecoveryContext> {
        let mut all: Vec<RecoveryContext> = self.inner.contexts.lock().values().cloned().collect();
        all.sort_by_key(|ctx| ctx.timestamp);
        all
    }

    /// Current phase of a recovery, including recently finished ones.
    pub fn phase(&self, recovery_id: &str) -> Option<RecoveryPhase> {
        if let Some(ctx) = self.inner.contexts.lock().get(recovery_id) {
            return Some(ctx.phase);
        }
        self.inner
            .outcomes
            .lock()
            .iter()
            .rev()
            .find(|(id, _)| id == recovery_id)
            .map(|(_, phase)| *phase)
    }

    /// Breaker snapshot for a `"{error_type}:{strategy_id}"` key.
    pub fn circuit_breaker(&self, key: &str) -> Option<CircuitBreakerState> {
        self.inner.breakers.state(key)
    }

    pub fn circuit_breakers(&self) -> HashMap<String, CircuitBreakerState> {
        self.inner.breakers.all()
    }

    // ========================================================================
    // Configuration and catalog
    // ========================================================================

    pub fn config(&self) -> OrchestratorConfig {
        self.inner.config.read().clone()
    }

    /// Merge `patch` into the live configuration.
    ///
    /// Rejected patches leave the configuration untouched. Changing cache
    /// settings drops cached selections.
    pub fn update_config(&self, patch: ConfigPatch) -> Result<()> {
        let mut config = self.inner.config.write();
        let cache_before = (config.enable_recovery_cache, config.recovery_cache_size);
        config.apply(&patch)?;
        if (config.enable_recovery_cache, config.recovery_cache_size) != cache_before {
            self.inner.catalog.clear_cache();
        }
        info!(?patch, "Orchestrator configuration updated");
        Ok(())
    }

    pub fn catalog(&self) -> &StrategyCatalog {
        &self.inner.catalog
    }

    /// Add or replace a strategy at runtime.
    pub fn register_strategy(&self, strategy: RecoveryStrategy) {
        debug!(strategy = %strategy.id, "Registering recovery strategy");
        self.inner.catalog.register(strategy);
    }
}

/// Puts a context left in `Executing` back to the phase it was resumed from
/// when the execution future is dropped before it finishes.
struct AbandonGuard<'a> {
    inner: &'a Inner,
    recovery_id: &'a str,
    resumed_phase: RecoveryPhase,
    armed: bool,
}

impl AbandonGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut contexts = self.inner.contexts.lock();
        if let Some(ctx) = contexts.get_mut(self.recovery_id) {
            if ctx.phase == RecoveryPhase::Executing {
                ctx.phase = self.resumed_phase;
                warn!(
                    recovery_id = self.recovery_id,
                    phase = %self.resumed_phase,
                    "Recovery execution abandoned"
                );
            }
        }
    }
}

/// Mark a context exhausted. A context already exhausted is left alone so
/// repeated executions do not count twice.
fn exhaust(analytics: &AnalyticsAggregator, ctx: &mut RecoveryContext, analytics_enabled: bool) {
    if ctx.phase == RecoveryPhase::Exhausted {
        return;
    }
    ctx.phase = RecoveryPhase::Exhausted;
    ctx.scheduled_retry = None;

    if analytics_enabled {
        analytics.record_exhausted(&ctx.error_type);
        if !ctx.predictive_suggestions.is_empty() {
            analytics.record_prediction(false);
        }
    }
    warn!(
        recovery_id = %ctx.error_id,
        error_type = %sanitize_for_log(&ctx.error_type),
        attempts = ctx.attempts,
        "Recovery exhausted"
    );
}

fn retry_task(
    inner: Weak<Inner>,
    recovery_id: String,
    strategy_id: String,
    token: u64,
) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let orchestrator = RecoveryOrchestrator { inner };
        if !orchestrator.claim_timer(&recovery_id, token) {
            debug!(recovery_id = %recovery_id, "Stale retry timer ignored");
            return;
        }
        match orchestrator.execute_recovery(&recovery_id, Some(&strategy_id)).await {
            Ok(recovered) => debug!(recovery_id = %recovery_id, strategy = %strategy_id, recovered, "Scheduled retry finished"),
            Err(e) => debug!(recovery_id = %recovery_id, error = %e, "Scheduled retry skipped"),
        }
    })
}
