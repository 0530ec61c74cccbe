//! Remedy - Error Recovery Orchestrator
//!
//! Turns raised errors into managed recoveries: pick candidate strategies,
//! run their remediation actions under per-action timeouts, gate repeated
//! failures with circuit breakers, retry fallbacks with backoff, and learn
//! which strategies work for which errors.
//!
//! - **Catalog**: Strategies matched by error kind or keywords, with a selection cache
//! - **Supervision**: Circuit breakers per `(error type, strategy)` and backoff delays
//! - **Orchestrator**: The recovery state machine and retry timers
//! - **Analytics**: Success rates, per-action performance, error patterns
//! - **Predictive**: Strategy suggestions from past recoveries
//!
//! # Quick Start
//!
//! ```ignore
//! use remedy::{builtin, OrchestratorConfig, RaisedError, RecoveryOrchestrator};
//!
//! let orchestrator = RecoveryOrchestrator::new(
//!     OrchestratorConfig::load(None)?,
//!     builtin::catalog(handler),
//! )?;
//! let id = orchestrator.initiate_recovery(
//!     RaisedError::new("NetworkError", "fetch failed: ECONNRESET"),
//!     serde_json::json!({ "url": "https://api.example.com" }),
//! );
//! let recovered = orchestrator.execute_recovery(&id, None).await?;
//! ```

// ─── Core ──────────────────────────────────────────────────────────
pub mod catalog;
pub mod config;
pub mod errors;
pub mod orchestrator;
pub mod supervision;

// ─── Learning ──────────────────────────────────────────────────────
pub mod analytics;
pub mod predictive;

// ─── Observability & CLI ───────────────────────────────────────────
pub mod cli;
pub mod observability;

pub use analytics::{ErrorPattern, RecoveryAnalytics, StrategyPerformance};
pub use catalog::builtin;
pub use catalog::{
    ActionKind, RaisedError, RecoverableErrorKind, RecoveryAction, RecoveryOperation,
    RecoveryStrategy, Severity, StrategyCatalog,
};
pub use config::{ConfigPatch, OrchestratorConfig};
pub use errors::{ActionFailure, RecoveryError};
pub use orchestrator::{
    RecoveryAttempt, RecoveryContext, RecoveryOrchestrator, RecoveryPhase, Scheduler,
    TokioScheduler,
};
pub use predictive::PredictiveSuggestion;
pub use supervision::{CircuitBreakerState, CircuitState};
