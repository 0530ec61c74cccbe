//! Built-in strategy table
//!
//! The built-in strategies describe *what* to try for common error classes.
//! The actual remediation work is delegated to a [`RemediationHandler`]
//! supplied by the host application, dispatched on the action's kind and id.

use super::{
    ActionKind, RecoverableErrorKind, RecoveryAction, RecoveryOperation, RecoveryStrategy,
    StrategyCatalog,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Host hook performing the remediation behind built-in actions.
#[async_trait]
pub trait RemediationHandler: Send + Sync {
    async fn perform(&self, kind: ActionKind, action_id: &str) -> anyhow::Result<bool>;
}

struct HandlerOperation {
    handler: Arc<dyn RemediationHandler>,
    kind: ActionKind,
    action_id: String,
}

#[async_trait]
impl RecoveryOperation for HandlerOperation {
    async fn execute(&self) -> anyhow::Result<bool> {
        self.handler.perform(self.kind, &self.action_id).await
    }
}

fn action(
    handler: &Arc<dyn RemediationHandler>,
    id: &str,
    kind: ActionKind,
    timeout_ms: u64,
) -> RecoveryAction {
    let operation = HandlerOperation {
        handler: Arc::clone(handler),
        kind,
        action_id: id.to_string(),
    };
    RecoveryAction::new(id, kind, Duration::from_millis(timeout_ms), Arc::new(operation))
}

/// The built-in strategies, wired to `handler`.
pub fn strategies(handler: Arc<dyn RemediationHandler>) -> Vec<RecoveryStrategy> {
    use RecoverableErrorKind::*;

    vec![
        RecoveryStrategy::new("network-retry", "Network retry")
            .with_description("Retry the request, then re-establish the transport")
            .with_priority(1)
            .with_conditions(["network", "fetch", "connection", "econnreset", "socket"])
            .with_kinds([Network])
            .with_action(action(&handler, "retry-request", ActionKind::Retry, 5_000))
            .with_action(
                action(&handler, "reconnect-transport", ActionKind::Reconnect, 10_000)
                    .with_side_effects(["drops in-flight requests"]),
            )
            .with_fallbacks(["cached-fallback"])
            .with_success_rate(0.8)
            .with_average_recovery_time(2_000),
        RecoveryStrategy::new("auth-refresh", "Credential refresh")
            .with_description("Refresh credentials and re-open the session")
            .with_priority(1)
            .with_conditions(["auth", "unauthorized", "401", "403", "token expired", "credential"])
            .with_kinds([Authentication])
            .with_action(action(&handler, "refresh-credentials", ActionKind::Refresh, 10_000))
            .with_action(
                action(&handler, "reconnect-session", ActionKind::Reconnect, 10_000)
                    .with_side_effects(["invalidates session"]),
            )
            .with_fallbacks(["state-reset"])
            .with_success_rate(0.85)
            .with_average_recovery_time(3_000),
        RecoveryStrategy::new("timeout-extend", "Extended-deadline retry")
            .with_description("Retry once with a longer deadline")
            .with_priority(2)
            .with_conditions(["timeout", "timed out", "deadline"])
            .with_kinds([Timeout])
            .with_action(action(&handler, "retry-extended", ActionKind::Retry, 15_000))
            .with_fallbacks(["cached-fallback"])
            .with_success_rate(0.7)
            .with_average_recovery_time(5_000),
        RecoveryStrategy::new("rate-limit-cooldown", "Rate limit cool-down")
            .with_description("Wait out the limit window, then retry")
            .with_priority(2)
            .with_conditions(["rate limit", "429", "too many requests", "throttl"])
            .with_kinds([RateLimit])
            .with_action(action(&handler, "retry-after-cooldown", ActionKind::Retry, 30_000))
            .with_fallbacks(["cached-fallback"])
            .with_success_rate(0.75)
            .with_average_recovery_time(10_000),
        RecoveryStrategy::new("cache-clear", "Cache clear and rebuild")
            .with_description("Drop local caches and rebuild derived storage")
            .with_priority(3)
            .with_conditions(["cache", "storage", "quota", "corrupt"])
            .with_kinds([Storage])
            .with_action(
                action(&handler, "clear-cache", ActionKind::Clear, 5_000)
                    .with_side_effects(["cold cache"]),
            )
            .with_action(action(&handler, "rebuild-index", ActionKind::Rebuild, 20_000))
            .with_fallbacks(["state-reset"])
            .with_success_rate(0.9)
            .with_average_recovery_time(4_000),
        RecoveryStrategy::new("state-reset", "State reset")
            .with_description("Reset component state and refresh the view")
            .with_priority(4)
            .with_conditions(["state", "invalid", "undefined", "null", "render"])
            .with_kinds([State])
            .with_action(
                action(&handler, "reset-state", ActionKind::Reset, 5_000)
                    .with_retryable(false)
                    .with_side_effects(["discards unsaved input"]),
            )
            .with_action(action(&handler, "refresh-view", ActionKind::Refresh, 5_000))
            .with_success_rate(0.75)
            .with_average_recovery_time(1_500),
        RecoveryStrategy::new("resource-rebuild", "Resource rebuild")
            .with_description("Release resources and rebuild the failing component")
            .with_priority(5)
            .with_conditions(["memory", "resource", "exhausted", "out of memory", "chunk"])
            .with_kinds([Resource])
            .with_action(action(&handler, "release-resources", ActionKind::Clear, 5_000))
            .with_action(
                action(&handler, "rebuild-component", ActionKind::Rebuild, 30_000)
                    .with_side_effects(["component restart"]),
            )
            .with_fallbacks(["state-reset"])
            .with_success_rate(0.6)
            .with_average_recovery_time(8_000),
        RecoveryStrategy::new("cached-fallback", "Serve cached data")
            .with_description("Fall back to the last known good data")
            .with_priority(6)
            .with_conditions(["offline", "unavailable", "502", "503"])
            .with_kinds([Network, Timeout, RateLimit])
            .with_action(action(&handler, "serve-cached", ActionKind::Fallback, 2_000))
            .with_success_rate(0.95)
            .with_average_recovery_time(500),
    ]
}

/// A catalog holding the built-in strategies.
pub fn catalog(handler: Arc<dyn RemediationHandler>) -> StrategyCatalog {
    StrategyCatalog::with_strategies(strategies(handler))
}
