//! Configuration Management
//!
//! Loads and manages orchestrator configuration from TOML files.
//! Configuration covers:
//! - Retry behaviour (attempt limit, base/max delay, exponential backoff)
//! - Circuit breaker threshold and cool-down
//! - Strategy selection cache
//! - Predictive recovery and analytics toggles
//!
//! Runtime changes go through [`ConfigPatch`], which only touches the fields
//! it carries.

use crate::errors::RecoveryError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Promote the historically best strategy to the front of the candidates
    #[serde(default = "default_true")]
    pub enable_intelligent_retry: bool,
    /// Schedule delayed retries through a strategy's fallbacks
    #[serde(default = "default_true")]
    pub enable_fallback_strategies: bool,
    #[serde(default = "default_true")]
    pub enable_recovery_analytics: bool,
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_base_retry_delay_ms")]
    pub base_retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_true")]
    pub exponential_backoff: bool,
    #[serde(default = "default_true")]
    pub enable_circuit_breaker: bool,
    /// Consecutive failures before a breaker opens
    #[serde(default = "default_circuit_breaker_threshold")]
    pub circuit_breaker_threshold: u32,
    /// How long an open breaker blocks before allowing a probe (ms)
    #[serde(default = "default_circuit_breaker_timeout_ms")]
    pub circuit_breaker_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub enable_recovery_cache: bool,
    #[serde(default = "default_recovery_cache_size")]
    pub recovery_cache_size: usize,
    #[serde(default = "default_true")]
    pub enable_predictive_recovery: bool,
    /// Minimum confidence (0.0 - 1.0) for a suggestion to be surfaced
    #[serde(default = "default_predictive_accuracy_threshold")]
    pub predictive_accuracy_threshold: f64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enable_intelligent_retry: true,
            enable_fallback_strategies: true,
            enable_recovery_analytics: true,
            max_retry_attempts: default_max_retry_attempts(),
            base_retry_delay_ms: default_base_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            exponential_backoff: true,
            enable_circuit_breaker: true,
            circuit_breaker_threshold: default_circuit_breaker_threshold(),
            circuit_breaker_timeout_ms: default_circuit_breaker_timeout_ms(),
            enable_recovery_cache: true,
            recovery_cache_size: default_recovery_cache_size(),
            enable_predictive_recovery: true,
            predictive_accuracy_threshold: default_predictive_accuracy_threshold(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_max_retry_attempts() -> u32 {
    3
}
fn default_base_retry_delay_ms() -> u64 {
    1000
}
fn default_max_retry_delay_ms() -> u64 {
    30_000
}
fn default_circuit_breaker_threshold() -> u32 {
    5
}
fn default_circuit_breaker_timeout_ms() -> u64 {
    60_000
}
fn default_recovery_cache_size() -> usize {
    100
}
fn default_predictive_accuracy_threshold() -> f64 {
    0.7
}

impl OrchestratorConfig {
    /// Load configuration from `path`, or from the default locations
    /// (`remedy.toml`, then `~/.config/remedy/config.toml`).
    ///
    /// Environment variables (`REMEDY_*`) override file values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config: Self = match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config from {}", p.display()))?;
                toml::from_str(&content).context("Failed to parse config")?
            }
            None => {
                let mut loaded = None;
                for p in default_paths() {
                    if let Ok(content) = std::fs::read_to_string(&p) {
                        debug!(path = %p.display(), "Loading config");
                        loaded = Some(toml::from_str(&content).context("Failed to parse config")?);
                        break;
                    }
                }
                loaded.unwrap_or_default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse("REMEDY_MAX_RETRY_ATTEMPTS") {
            self.max_retry_attempts = v;
        }
        if let Some(v) = env_parse("REMEDY_BASE_RETRY_DELAY_MS") {
            self.base_retry_delay_ms = v;
        }
        if let Some(v) = env_parse("REMEDY_MAX_RETRY_DELAY_MS") {
            self.max_retry_delay_ms = v;
        }
        if let Some(v) = env_parse("REMEDY_CIRCUIT_BREAKER_THRESHOLD") {
            self.circuit_breaker_threshold = v;
        }
        if let Some(v) = env_parse("REMEDY_CIRCUIT_BREAKER_TIMEOUT_MS") {
            self.circuit_breaker_timeout_ms = v;
        }
    }

    /// Reject configurations the orchestrator cannot run with.
    pub fn validate(&self) -> std::result::Result<(), RecoveryError> {
        if self.circuit_breaker_threshold == 0 {
            return Err(RecoveryError::Config(
                "circuit_breaker_threshold must be at least 1".to_string(),
            ));
        }
        if self.max_retry_delay_ms < self.base_retry_delay_ms {
            return Err(RecoveryError::Config(format!(
                "max_retry_delay_ms ({}) is below base_retry_delay_ms ({})",
                self.max_retry_delay_ms, self.base_retry_delay_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.predictive_accuracy_threshold) {
            return Err(RecoveryError::Config(format!(
                "predictive_accuracy_threshold must be within 0.0..=1.0, got {}",
                self.predictive_accuracy_threshold
            )));
        }
        Ok(())
    }

    /// Apply a partial update. Fields absent from the patch are left alone.
    ///
    /// The patched configuration is validated before it replaces `self`.
    pub fn apply(&mut self, patch: &ConfigPatch) -> std::result::Result<(), RecoveryError> {
        let mut next = self.clone();
        if let Some(v) = patch.enable_intelligent_retry {
            next.enable_intelligent_retry = v;
        }
        if let Some(v) = patch.enable_fallback_strategies {
            next.enable_fallback_strategies = v;
        }
        if let Some(v) = patch.enable_recovery_analytics {
            next.enable_recovery_analytics = v;
        }
        if let Some(v) = patch.max_retry_attempts {
            next.max_retry_attempts = v;
        }
        if let Some(v) = patch.base_retry_delay_ms {
            next.base_retry_delay_ms = v;
        }
        if let Some(v) = patch.max_retry_delay_ms {
            next.max_retry_delay_ms = v;
        }
        if let Some(v) = patch.exponential_backoff {
            next.exponential_backoff = v;
        }
        if let Some(v) = patch.enable_circuit_breaker {
            next.enable_circuit_breaker = v;
        }
        if let Some(v) = patch.circuit_breaker_threshold {
            next.circuit_breaker_threshold = v;
        }
        if let Some(v) = patch.circuit_breaker_timeout_ms {
            next.circuit_breaker_timeout_ms = v;
        }
        if let Some(v) = patch.enable_recovery_cache {
            next.enable_recovery_cache = v;
        }
        if let Some(v) = patch.recovery_cache_size {
            next.recovery_cache_size = v;
        }
        if let Some(v) = patch.enable_predictive_recovery {
            next.enable_predictive_recovery = v;
        }
        if let Some(v) = patch.predictive_accuracy_threshold {
            next.predictive_accuracy_threshold = v;
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    pub fn base_retry_delay(&self) -> Duration {
        Duration::from_millis(self.base_retry_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    pub fn circuit_breaker_timeout(&self) -> Duration {
        Duration::from_millis(self.circuit_breaker_timeout_ms)
    }
}

fn default_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("remedy.toml")];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/remedy/config.toml"));
    }
    paths
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}

/// Partial configuration update.
///
/// Every field is optional; deserializes from the same keys as
/// [`OrchestratorConfig`], so a TOML or JSON fragment can be applied directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    pub enable_intelligent_retry: Option<bool>,
    pub enable_fallback_strategies: Option<bool>,
    pub enable_recovery_analytics: Option<bool>,
    pub max_retry_attempts: Option<u32>,
    pub base_retry_delay_ms: Option<u64>,
    pub max_retry_delay_ms: Option<u64>,
    pub exponential_backoff: Option<bool>,
    pub enable_circuit_breaker: Option<bool>,
    pub circuit_breaker_threshold: Option<u32>,
    pub circuit_breaker_timeout_ms: Option<u64>,
    pub enable_recovery_cache: Option<bool>,
    pub recovery_cache_size: Option<usize>,
    pub enable_predictive_recovery: Option<bool>,
    pub predictive_accuracy_threshold: Option<f64>,
}
