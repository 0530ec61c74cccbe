//! Integration tests for the recovery orchestrator
//!
//! Tests cover:
//! - Fallback retries through the built-in catalog
//! - Circuit breaker gating across recoveries
//! - Action timeouts
//! - Predictive suggestions and intelligent retry ordering
//! - Exhaustion, cancellation and analytics reset
//! - Cancellation and abandonment while an action is running

use parking_lot::Mutex;
use remedy::builtin::{self, RemediationHandler};
use remedy::config::ConfigPatch;
use remedy::observability::NullMetricsProbe;
use remedy::{
    ActionKind, CircuitState, OrchestratorConfig, RaisedError, RecoverableErrorKind,
    RecoveryAction, RecoveryAnalytics, RecoveryError, RecoveryOrchestrator, RecoveryPhase,
    RecoveryStrategy, StrategyCatalog,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const POLL: Duration = Duration::from_millis(100);

/// Handler whose failing actions can be changed between calls.
#[derive(Default)]
struct ScriptedHandler {
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedHandler {
    fn failing(ids: &[&str]) -> Arc<Self> {
        let handler = Self::default();
        handler
            .failing
            .lock()
            .extend(ids.iter().map(|id| id.to_string()));
        Arc::new(handler)
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait::async_trait]
impl RemediationHandler for ScriptedHandler {
    async fn perform(&self, _kind: ActionKind, action_id: &str) -> anyhow::Result<bool> {
        self.calls.lock().push(action_id.to_string());
        if self.failing.lock().contains(action_id) {
            anyhow::bail!("{} still broken", action_id);
        }
        Ok(true)
    }
}

fn build(config: OrchestratorConfig, catalog: StrategyCatalog) -> RecoveryOrchestrator {
    RecoveryOrchestrator::builder()
        .config(config)
        .catalog(catalog)
        .metrics_probe(Arc::new(NullMetricsProbe))
        .build()
        .unwrap()
}

fn outcome(id: &str, result: bool) -> RecoveryAction {
    RecoveryAction::from_fn(id, ActionKind::Retry, Duration::from_millis(500), move || async move {
        Ok(result)
    })
}

fn network_error() -> RaisedError {
    RaisedError::new("NetworkError", "fetch failed: ECONNRESET")
}

// ============================================================================
// Fallback path
// ============================================================================

mod fallback_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_failing_strategy_recovers_through_fallback() {
        let handler = ScriptedHandler::failing(&["retry-request", "reconnect-transport"]);
        let orch = build(OrchestratorConfig::default(), builtin::catalog(handler.clone()));

        let id = orch.initiate_recovery(network_error(), serde_json::json!({"url": "/api/items"}));
        assert!(!orch.execute_recovery(&id, None).await.unwrap());

        let ctx = orch.recovery(&id).unwrap();
        assert_eq!(ctx.phase, RecoveryPhase::RetryScheduled);
        assert_eq!(ctx.attempts, 1);
        assert_eq!(ctx.history.len(), 2);
        assert!(ctx.history.iter().all(|a| !a.success));
        assert_eq!(
            ctx.history[0].error.as_deref(),
            Some("Action 'retry-request' failed: retry-request still broken")
        );
        assert_eq!(ctx.scheduled_retry.unwrap().strategy_id, "cached-fallback");

        let phase = orch.wait_until_settled(&id, POLL).await;
        assert_eq!(phase, Some(RecoveryPhase::Succeeded));
        assert!(orch.recovery(&id).is_none());

        assert_eq!(
            handler.calls(),
            vec!["retry-request", "reconnect-transport", "serve-cached"]
        );

        let analytics = orch.analytics();
        assert_eq!(analytics.total_recoveries, 1);
        assert_eq!(analytics.successful_recoveries, 1);
        assert_eq!(
            analytics.error_patterns["NetworkError"].best_strategy.as_deref(),
            Some("cached-fallback")
        );

        let breaker = orch.circuit_breaker("NetworkError:network-retry").unwrap();
        assert_eq!(breaker.failures, 2);
        assert_eq!(breaker.state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_waits_for_backoff_delay() {
        let handler = ScriptedHandler::failing(&["retry-request", "reconnect-transport"]);
        let orch = build(OrchestratorConfig::default(), builtin::catalog(handler.clone()));

        let id = orch.initiate_recovery(network_error(), serde_json::Value::Null);
        orch.execute_recovery(&id, None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(orch.phase(&id), Some(RecoveryPhase::RetryScheduled));
        assert_eq!(handler.calls().len(), 2);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(orch.phase(&id), Some(RecoveryPhase::Succeeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_self_fallback_exhausts_after_max_attempts() {
        let catalog = StrategyCatalog::with_strategies([RecoveryStrategy::new("loop", "Loop")
            .with_conditions(["flaky"])
            .with_action(outcome("poke", false))
            .with_fallbacks(["loop"])]);
        let orch = build(OrchestratorConfig::default(), catalog);

        let id = orch.initiate_recovery(RaisedError::new("FlakyError", "flaky"), serde_json::Value::Null);
        orch.execute_recovery(&id, None).await.unwrap();

        let phase = orch.wait_until_settled(&id, POLL).await;
        assert_eq!(phase, Some(RecoveryPhase::Exhausted));

        let ctx = orch.recovery(&id).unwrap();
        assert_eq!(ctx.attempts, 3);
        assert_eq!(ctx.history.len(), 3);
        assert!(ctx.scheduled_retry.is_none());
        assert_eq!(orch.active_recoveries().len(), 1);

        let pattern = &orch.analytics().error_patterns["FlakyError"];
        assert_eq!(pattern.frequency, 1);
        assert_eq!(pattern.success_rate, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exponential_delays_between_retries() {
        let catalog = StrategyCatalog::with_strategies([RecoveryStrategy::new("loop", "Loop")
            .with_conditions(["flaky"])
            .with_action(outcome("poke", false))
            .with_fallbacks(["loop"])]);
        let orch = build(OrchestratorConfig::default(), catalog);

        let id = orch.initiate_recovery(RaisedError::new("FlakyError", "flaky"), serde_json::Value::Null);
        orch.execute_recovery(&id, None).await.unwrap();
        assert_eq!(orch.recovery(&id).unwrap().scheduled_retry.unwrap().delay_ms, 1_000);

        tokio::time::sleep(Duration::from_millis(1_050)).await;
        let ctx = orch.recovery(&id).unwrap();
        assert_eq!(ctx.attempts, 2);
        assert_eq!(ctx.scheduled_retry.unwrap().delay_ms, 2_000);
    }
}

// ============================================================================
// Circuit breaker
// ============================================================================

mod breaker_tests {
    use super::*;

    struct Toggle(Arc<AtomicBool>);

    #[async_trait::async_trait]
    impl remedy::RecoveryOperation for Toggle {
        async fn execute(&self) -> anyhow::Result<bool> {
            Ok(self.0.load(Ordering::SeqCst))
        }
    }

    fn config() -> OrchestratorConfig {
        OrchestratorConfig {
            circuit_breaker_threshold: 3,
            enable_fallback_strategies: false,
            ..Default::default()
        }
    }

    fn toggled(healthy: &Arc<AtomicBool>) -> StrategyCatalog {
        StrategyCatalog::with_strategies([RecoveryStrategy::new("reconnect", "Reconnect")
            .with_kinds([RecoverableErrorKind::Network])
            .with_action(RecoveryAction::new(
                "reconnect-socket",
                ActionKind::Reconnect,
                Duration::from_millis(500),
                Arc::new(Toggle(Arc::clone(healthy))),
            ))])
    }

    fn tagged() -> RaisedError {
        RaisedError::new("SocketError", "peer went away").with_kind(RecoverableErrorKind::Network)
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_blocks_without_history() {
        let healthy = Arc::new(AtomicBool::new(false));
        let orch = build(config(), toggled(&healthy));

        for _ in 0..3 {
            let id = orch.initiate_recovery(tagged(), serde_json::Value::Null);
            assert!(!orch.execute_recovery(&id, None).await.unwrap());
        }
        let breaker = orch.circuit_breaker("SocketError:reconnect").unwrap();
        assert_eq!(breaker.state, CircuitState::Open);
        assert_eq!(orch.analytics().circuit_breaker_events, 1);

        let id = orch.initiate_recovery(tagged(), serde_json::Value::Null);
        assert!(!orch.execute_recovery(&id, None).await.unwrap());
        let ctx = orch.recovery(&id).unwrap();
        assert_eq!(ctx.phase, RecoveryPhase::Blocked);
        assert_eq!(ctx.attempts, 0);
        assert!(ctx.history.is_empty());
        assert_eq!(ctx.circuit_breaker_state.unwrap().state, CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_half_opens_and_closes_after_timeout() {
        let healthy = Arc::new(AtomicBool::new(false));
        let orch = build(config(), toggled(&healthy));

        for _ in 0..3 {
            let id = orch.initiate_recovery(tagged(), serde_json::Value::Null);
            orch.execute_recovery(&id, None).await.unwrap();
        }

        let id = orch.initiate_recovery(tagged(), serde_json::Value::Null);
        assert!(!orch.execute_recovery(&id, None).await.unwrap());

        tokio::time::advance(Duration::from_millis(60_001)).await;
        healthy.store(true, Ordering::SeqCst);

        assert!(orch.execute_recovery(&id, None).await.unwrap());
        let breaker = orch.circuit_breaker("SocketError:reconnect").unwrap();
        assert_eq!(breaker.state, CircuitState::Closed);
        assert_eq!(breaker.failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_breaker_never_blocks() {
        let healthy = Arc::new(AtomicBool::new(false));
        let orch = build(
            OrchestratorConfig {
                enable_circuit_breaker: false,
                ..config()
            },
            toggled(&healthy),
        );

        for _ in 0..10 {
            let id = orch.initiate_recovery(tagged(), serde_json::Value::Null);
            orch.execute_recovery(&id, None).await.unwrap();
            assert_eq!(orch.recovery(&id).unwrap().history.len(), 1);
        }
        assert!(orch.circuit_breakers().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_breakers_are_keyed_by_error_type() {
        let healthy = Arc::new(AtomicBool::new(false));
        let orch = build(config(), toggled(&healthy));

        for _ in 0..3 {
            let id = orch.initiate_recovery(tagged(), serde_json::Value::Null);
            orch.execute_recovery(&id, None).await.unwrap();
        }

        let other = RaisedError::new("DnsError", "lookup failed").with_kind(RecoverableErrorKind::Network);
        let id = orch.initiate_recovery(other, serde_json::Value::Null);
        orch.execute_recovery(&id, None).await.unwrap();
        assert_eq!(orch.recovery(&id).unwrap().history.len(), 1);
    }
}

// ============================================================================
// Timeouts
// ============================================================================

mod timeout_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_never_settling_action_recorded_once_as_timeout() {
        let catalog = StrategyCatalog::with_strategies([RecoveryStrategy::new("stuck", "Stuck")
            .with_conditions(["stuck"])
            .with_action(RecoveryAction::from_fn(
                "wait-forever",
                ActionKind::Refresh,
                Duration::from_millis(200),
                || futures::future::pending(),
            ))]);
        let orch = build(OrchestratorConfig::default(), catalog);

        let id = orch.initiate_recovery(RaisedError::new("StuckError", "stuck"), serde_json::Value::Null);
        assert!(!orch.execute_recovery(&id, None).await.unwrap());

        tokio::time::sleep(Duration::from_secs(5)).await;
        let ctx = orch.recovery(&id).unwrap();
        assert_eq!(ctx.history.len(), 1);
        let attempt = &ctx.history[0];
        assert!(attempt.timed_out);
        assert!(!attempt.success);
        assert_eq!(
            attempt.error.as_deref(),
            Some("Action 'wait-forever' timed out after 200ms")
        );
        assert_eq!(ctx.phase, RecoveryPhase::Exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_moves_on_to_next_action() {
        let catalog = StrategyCatalog::with_strategies([RecoveryStrategy::new("stuck", "Stuck")
            .with_conditions(["stuck"])
            .with_action(RecoveryAction::from_fn(
                "wait-forever",
                ActionKind::Refresh,
                Duration::from_millis(200),
                || futures::future::pending(),
            ))
            .with_action(outcome("kick", true))]);
        let orch = build(OrchestratorConfig::default(), catalog);

        let id = orch.initiate_recovery(RaisedError::new("StuckError", "stuck"), serde_json::Value::Null);
        assert!(orch.execute_recovery(&id, None).await.unwrap());

        let analytics = orch.analytics();
        assert_eq!(analytics.strategy_performance[&ActionKind::Refresh].successes, 0);
        assert_eq!(analytics.strategy_performance[&ActionKind::Retry].successes, 1);
    }
}

// ============================================================================
// Predictive suggestions
// ============================================================================

mod predictive_tests {
    use super::*;

    fn catalog(handler: Arc<ScriptedHandler>) -> StrategyCatalog {
        builtin::catalog(handler)
    }

    #[tokio::test(start_paused = true)]
    async fn test_suggestions_appear_after_success() {
        let handler = ScriptedHandler::failing(&[]);
        let orch = build(OrchestratorConfig::default(), catalog(handler));

        assert!(orch
            .recovery_suggestions("NetworkError", &serde_json::Value::Null)
            .is_empty());

        let (_, recovered) = orch.recover(network_error(), serde_json::Value::Null).await.unwrap();
        assert!(recovered);

        let suggestions = orch.recovery_suggestions("NetworkError", &serde_json::Value::Null);
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].strategy, "network-retry");
        assert_eq!(suggestions[0].reasoning, "based on 1 previous occurrences");
        assert!((suggestions[0].confidence - 1.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_predictive_disabled_yields_nothing() {
        let handler = ScriptedHandler::failing(&[]);
        let orch = build(
            OrchestratorConfig {
                enable_predictive_recovery: false,
                ..Default::default()
            },
            catalog(handler),
        );
        orch.recover(network_error(), serde_json::Value::Null).await.unwrap();
        assert!(orch
            .recovery_suggestions("NetworkError", &serde_json::Value::Null)
            .is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_intelligent_retry_promotes_best_strategy() {
        let handler = ScriptedHandler::failing(&["retry-request", "reconnect-transport"]);
        let orch = build(OrchestratorConfig::default(), catalog(handler.clone()));

        let error = || network_error().with_kind(RecoverableErrorKind::Network);
        let first = orch.initiate_recovery(error(), serde_json::Value::Null);
        assert_eq!(orch.recovery(&first).unwrap().strategies[0].id, "network-retry");
        orch.execute_recovery(&first, None).await.unwrap();
        assert_eq!(
            orch.wait_until_settled(&first, POLL).await,
            Some(RecoveryPhase::Succeeded)
        );

        let second = orch.initiate_recovery(error(), serde_json::Value::Null);
        let ctx = orch.recovery(&second).unwrap();
        assert_eq!(ctx.predictive_suggestions[0].strategy, "cached-fallback");
        assert_eq!(ctx.strategies[0].id, "cached-fallback");

        assert!(orch.execute_recovery(&second, None).await.unwrap());
        let analytics = orch.analytics();
        assert_eq!(analytics.predictions_evaluated, 1);
        assert!((analytics.predictive_accuracy - 1.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_intelligent_retry_disabled_keeps_ranking() {
        let handler = ScriptedHandler::failing(&["retry-request", "reconnect-transport"]);
        let orch = build(
            OrchestratorConfig {
                enable_intelligent_retry: false,
                ..Default::default()
            },
            catalog(handler),
        );

        let error = || network_error().with_kind(RecoverableErrorKind::Network);
        let first = orch.initiate_recovery(error(), serde_json::Value::Null);
        orch.execute_recovery(&first, None).await.unwrap();
        orch.wait_until_settled(&first, POLL).await;

        let second = orch.initiate_recovery(error(), serde_json::Value::Null);
        let ctx = orch.recovery(&second).unwrap();
        assert!(!ctx.predictive_suggestions.is_empty());
        assert_eq!(ctx.strategies[0].id, "network-retry");
    }
}

// ============================================================================
// Lifecycle and analytics
// ============================================================================

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_not_found_for_unknown_id() {
        let orch = build(OrchestratorConfig::default(), StrategyCatalog::new());
        let err = orch.execute_recovery("recovery_nope", None).await.unwrap_err();
        assert!(matches!(err, RecoveryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_explicit_strategy_overrides_candidates() {
        let handler = ScriptedHandler::failing(&[]);
        let orch = build(OrchestratorConfig::default(), builtin::catalog(handler.clone()));

        let id = orch.initiate_recovery(network_error(), serde_json::Value::Null);
        assert!(orch.execute_recovery(&id, Some("state-reset")).await.unwrap());
        assert_eq!(handler.calls(), vec!["reset-state"]);
    }

    #[tokio::test]
    async fn test_cancel_twice_is_noop() {
        let orch = build(OrchestratorConfig::default(), StrategyCatalog::new());
        let id = orch.initiate_recovery(network_error(), serde_json::Value::Null);
        assert!(orch.cancel_recovery(&id));
        assert!(!orch.cancel_recovery(&id));
        assert!(matches!(
            orch.execute_recovery(&id, None).await,
            Err(RecoveryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reset_analytics_restores_initial_shape() {
        let handler = ScriptedHandler::failing(&[]);
        let orch = build(OrchestratorConfig::default(), builtin::catalog(handler));
        orch.recover(network_error(), serde_json::Value::Null).await.unwrap();
        assert_ne!(orch.analytics(), RecoveryAnalytics::default());

        orch.reset_analytics();
        assert_eq!(orch.analytics(), RecoveryAnalytics::default());
    }

    #[tokio::test]
    async fn test_concurrent_recoveries_are_independent() {
        let handler = ScriptedHandler::failing(&[]);
        let orch = build(OrchestratorConfig::default(), builtin::catalog(handler));

        let a = orch.initiate_recovery(network_error(), serde_json::Value::Null);
        let b = orch.initiate_recovery(
            RaisedError::new("AuthError", "401 unauthorized"),
            serde_json::Value::Null,
        );
        assert_ne!(a, b);

        let (ra, rb) = tokio::join!(orch.execute_recovery(&a, None), orch.execute_recovery(&b, None));
        assert!(ra.unwrap());
        assert!(rb.unwrap());

        let analytics = orch.analytics();
        assert_eq!(analytics.total_recoveries, 2);
        assert_eq!(analytics.successful_recoveries, 2);
        assert!(orch.active_recoveries().is_empty());
    }

    #[tokio::test]
    async fn test_registered_strategy_invalidates_selection_cache() {
        let orch = build(OrchestratorConfig::default(), StrategyCatalog::new());
        let first = orch.initiate_recovery(network_error(), serde_json::Value::Null);
        assert!(orch.recovery(&first).unwrap().strategies.is_empty());

        orch.register_strategy(
            RecoveryStrategy::new("net", "Net")
                .with_conditions(["network"])
                .with_action(outcome("retry", true)),
        );
        let second = orch.initiate_recovery(network_error(), serde_json::Value::Null);
        assert_eq!(orch.recovery(&second).unwrap().strategies.len(), 1);
    }

    #[tokio::test]
    async fn test_cache_patch_clears_cached_selection() {
        let orch = build(OrchestratorConfig::default(), StrategyCatalog::new());
        orch.initiate_recovery(network_error(), serde_json::Value::Null);
        orch.initiate_recovery(network_error(), serde_json::Value::Null);
        assert_eq!(orch.catalog().cache_stats().hits, 1);

        orch.update_config(ConfigPatch {
            recovery_cache_size: Some(10),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(orch.catalog().cache_stats().entries, 0);
        assert_eq!(orch.config().recovery_cache_size, 10);
    }

    #[tokio::test]
    async fn test_context_snapshot_serializes() {
        let handler = ScriptedHandler::failing(&[]);
        let orch = build(OrchestratorConfig::default(), builtin::catalog(handler));
        let id = orch.initiate_recovery(
            network_error(),
            serde_json::json!({"request_id": 42}),
        );

        let json = serde_json::to_value(orch.recovery(&id).unwrap()).unwrap();
        assert_eq!(json["error_id"], id.as_str());
        assert_eq!(json["phase"], "initiated");
        assert_eq!(json["context"]["request_id"], 42);
        assert_eq!(json["strategies"][0]["id"], "network-retry");
    }
}

// ============================================================================
// Interrupted executions
// ============================================================================

mod interruption_tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    /// Counts calls; the first call takes `first_delay`, later calls return at once.
    fn counted(id: &str, first_delay: Duration, result: bool, calls: &Arc<AtomicU32>) -> RecoveryAction {
        let calls = Arc::clone(calls);
        RecoveryAction::from_fn(id, ActionKind::Reconnect, Duration::from_secs(60), move || {
            let calls = Arc::clone(&calls);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    tokio::time::sleep(first_delay).await;
                }
                Ok(result)
            }
        })
    }

    fn single(actions: Vec<RecoveryAction>) -> RecoveryOrchestrator {
        let strategy = actions.into_iter().fold(
            RecoveryStrategy::new("reconnect", "Reconnect").with_conditions(["socket"]),
            |s, a| s.with_action(a),
        );
        build(OrchestratorConfig::default(), StrategyCatalog::with_strategies([strategy]))
    }

    fn socket_error() -> RaisedError {
        RaisedError::new("SocketError", "socket closed")
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_execution_can_run_again() {
        let calls = Arc::new(AtomicU32::new(0));
        let orch = single(vec![counted("reopen", Duration::from_secs(10), true, &calls)]);
        let id = orch.initiate_recovery(socket_error(), serde_json::Value::Null);

        let abandoned = tokio::time::timeout(Duration::from_secs(1), orch.execute_recovery(&id, None)).await;
        assert!(abandoned.is_err());

        let ctx = orch.recovery(&id).unwrap();
        assert_eq!(ctx.phase, RecoveryPhase::Initiated);
        assert_eq!(ctx.attempts, 1);
        assert!(ctx.history.is_empty());

        assert!(orch.execute_recovery(&id, None).await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            orch.wait_until_settled(&id, POLL).await,
            Some(RecoveryPhase::Succeeded)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_successful_action_reports_not_recovered() {
        let calls = Arc::new(AtomicU32::new(0));
        let orch = single(vec![counted("reopen", Duration::from_secs(5), true, &calls)]);
        let id = orch.initiate_recovery(socket_error(), serde_json::Value::Null);

        let running = {
            let orch = orch.clone();
            let id = id.clone();
            tokio::spawn(async move { orch.execute_recovery(&id, None).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(orch.cancel_recovery(&id));

        assert!(!running.await.unwrap().unwrap());
        assert_eq!(orch.phase(&id), Some(RecoveryPhase::Cancelled));
        let analytics = orch.analytics();
        assert_eq!(analytics.total_recoveries, 1);
        assert_eq!(analytics.successful_recoveries, 0);
        assert!(analytics.error_patterns.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_action_skips_remaining_actions() {
        let first = Arc::new(AtomicU32::new(0));
        let second = Arc::new(AtomicU32::new(0));
        let orch = single(vec![
            counted("reopen", Duration::from_secs(5), false, &first),
            counted("rebind", Duration::ZERO, true, &second),
        ]);
        let id = orch.initiate_recovery(socket_error(), serde_json::Value::Null);

        let running = {
            let orch = orch.clone();
            let id = id.clone();
            tokio::spawn(async move { orch.execute_recovery(&id, None).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(orch.cancel_recovery(&id));

        assert!(!running.await.unwrap().unwrap());
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
        assert_eq!(orch.phase(&id), Some(RecoveryPhase::Cancelled));

        let analytics = orch.analytics();
        assert_eq!(analytics.successful_recoveries, 0);
        assert!(analytics.error_patterns.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_concurrent_execute_does_not_run_actions() {
        let calls = Arc::new(AtomicU32::new(0));
        let orch = single(vec![counted("reopen", Duration::from_secs(5), true, &calls)]);
        let id = orch.initiate_recovery(socket_error(), serde_json::Value::Null);

        let running = {
            let orch = orch.clone();
            let id = id.clone();
            tokio::spawn(async move { orch.execute_recovery(&id, None).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(orch.phase(&id), Some(RecoveryPhase::Executing));

        assert!(!orch.execute_recovery(&id, None).await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(orch.recovery(&id).unwrap().attempts, 1);

        assert!(running.await.unwrap().unwrap());
        assert_eq!(orch.phase(&id), Some(RecoveryPhase::Succeeded));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
