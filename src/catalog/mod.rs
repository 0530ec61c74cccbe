//! Strategy Catalog
//!
//! Registered [`RecoveryStrategy`] definitions and the selection step that
//! turns a raised error into a ranked list of candidate strategies.
//!
//! Selection prefers the explicit [`RecoverableErrorKind`] tag carried by a
//! [`RaisedError`]. Keyword matching against the error's type name and
//! message is the fallback for untagged errors, or for kinds no strategy
//! declares.

pub mod builtin;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Number of message characters that take part in the selection cache key.
const CACHE_KEY_MESSAGE_CHARS: usize = 50;

// ============================================================================
// Raised errors
// ============================================================================

/// Explicit classification supplied by the caller alongside a raised error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoverableErrorKind {
    Network,
    Timeout,
    RateLimit,
    Authentication,
    Storage,
    State,
    Resource,
}

impl std::fmt::Display for RecoverableErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RecoverableErrorKind::Network => "network",
            RecoverableErrorKind::Timeout => "timeout",
            RecoverableErrorKind::RateLimit => "rate_limit",
            RecoverableErrorKind::Authentication => "authentication",
            RecoverableErrorKind::Storage => "storage",
            RecoverableErrorKind::State => "state",
            RecoverableErrorKind::Resource => "resource",
        };
        write!(f, "{}", name)
    }
}

/// How bad the raised error is, as judged by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// An error handed to the orchestrator for recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaisedError {
    /// Error class name, e.g. `NetworkError`
    pub type_name: String,
    pub message: String,
    /// Caller-supplied classification; `None` falls back to keyword matching
    pub kind: Option<RecoverableErrorKind>,
    #[serde(default)]
    pub severity: Severity,
}

impl RaisedError {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            kind: None,
            severity: Severity::default(),
        }
    }

    /// Build from a Rust error value, using the last path segment of its type
    /// as the type name.
    pub fn from_error<E: std::error::Error>(error: &E) -> Self {
        let full = std::any::type_name::<E>();
        let short = full
            .split('<')
            .next()
            .and_then(|path| path.rsplit("::").next())
            .unwrap_or(full);
        Self::new(short, error.to_string())
    }

    pub fn with_kind(mut self, kind: RecoverableErrorKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    fn cache_key(&self) -> String {
        let prefix: String = self.message.chars().take(CACHE_KEY_MESSAGE_CHARS).collect();
        match self.kind {
            Some(kind) => format!("{}:{}#{}", self.type_name, prefix, kind),
            None => format!("{}:{}", self.type_name, prefix),
        }
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Kind of remediation an action performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Retry,
    Fallback,
    Reset,
    Refresh,
    Reconnect,
    Clear,
    Rebuild,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Retry => "retry",
            ActionKind::Fallback => "fallback",
            ActionKind::Reset => "reset",
            ActionKind::Refresh => "refresh",
            ActionKind::Reconnect => "reconnect",
            ActionKind::Clear => "clear",
            ActionKind::Rebuild => "rebuild",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The remediation work behind a [`RecoveryAction`].
///
/// `Ok(true)` means the action fixed the problem. `Ok(false)` and `Err(_)`
/// are both failures; the error text is kept in the attempt history.
#[async_trait]
pub trait RecoveryOperation: Send + Sync {
    async fn execute(&self) -> anyhow::Result<bool>;
}

/// Adapter turning an async closure into a [`RecoveryOperation`].
pub struct FnOperation<F>(F);

#[async_trait]
impl<F, Fut> RecoveryOperation for FnOperation<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<bool>> + Send,
{
    async fn execute(&self) -> anyhow::Result<bool> {
        (self.0)().await
    }
}

/// A single remediation step of a strategy.
#[derive(Clone, Serialize)]
pub struct RecoveryAction {
    pub id: String,
    pub kind: ActionKind,
    pub timeout_ms: u64,
    pub retryable: bool,
    /// Informational labels, e.g. `"drops in-flight requests"`
    pub side_effects: Vec<String>,
    #[serde(skip)]
    operation: Arc<dyn RecoveryOperation>,
}

impl RecoveryAction {
    pub fn new(
        id: impl Into<String>,
        kind: ActionKind,
        timeout: Duration,
        operation: Arc<dyn RecoveryOperation>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            timeout_ms: timeout.as_millis() as u64,
            retryable: true,
            side_effects: Vec::new(),
            operation,
        }
    }

    /// Build an action from an async closure.
    pub fn from_fn<F, Fut>(id: impl Into<String>, kind: ActionKind, timeout: Duration, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        Self::new(id, kind, timeout, Arc::new(FnOperation(f)))
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_side_effects<I, S>(mut self, effects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.side_effects = effects.into_iter().map(Into::into).collect();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn operation(&self) -> Arc<dyn RecoveryOperation> {
        Arc::clone(&self.operation)
    }
}

impl std::fmt::Debug for RecoveryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryAction")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("timeout_ms", &self.timeout_ms)
            .field("retryable", &self.retryable)
            .field("side_effects", &self.side_effects)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Strategies
// ============================================================================

/// A prioritized bundle of remediation actions for a class of errors.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryStrategy {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Lower is tried first
    pub priority: u32,
    /// Keyword tokens matched against the error type name and message
    pub conditions: Vec<String>,
    /// Error kinds this strategy handles when callers tag their errors
    pub kinds: Vec<RecoverableErrorKind>,
    pub actions: Vec<RecoveryAction>,
    /// Strategy ids to retry with, in order, when every action fails
    pub fallback_strategies: Vec<String>,
    /// Static seed (0.0 - 1.0)
    pub success_rate: f64,
    pub average_recovery_time_ms: u64,
}

impl RecoveryStrategy {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            priority: 0,
            conditions: Vec::new(),
            kinds: Vec::new(),
            actions: Vec::new(),
            fallback_strategies: Vec::new(),
            success_rate: 0.5,
            average_recovery_time_ms: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Conditions are stored lower-cased.
    pub fn with_conditions<I, S>(mut self, conditions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.conditions = conditions
            .into_iter()
            .map(|c| c.into().to_lowercase())
            .collect();
        self
    }

    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = RecoverableErrorKind>) -> Self {
        self.kinds = kinds.into_iter().collect();
        self
    }

    pub fn with_action(mut self, action: RecoveryAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_fallbacks<I, S>(mut self, fallbacks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_strategies = fallbacks.into_iter().map(Into::into).collect();
        self
    }

    /// Clamped to 0.0 - 1.0; NaN counts as 0.0.
    pub fn with_success_rate(mut self, rate: f64) -> Self {
        self.success_rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
        self
    }

    pub fn with_average_recovery_time(mut self, ms: u64) -> Self {
        self.average_recovery_time_ms = ms;
        self
    }

    /// True when any condition, compared case-insensitively, is a substring
    /// of the lower-cased type name or message.
    pub fn matches_keywords(&self, type_name_lower: &str, message_lower: &str) -> bool {
        self.conditions.iter().any(|c| {
            let c = c.to_lowercase();
            message_lower.contains(c.as_str()) || type_name_lower.contains(c.as_str())
        })
    }

    pub fn handles(&self, kind: RecoverableErrorKind) -> bool {
        self.kinds.contains(&kind)
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Cache settings for strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub enabled: bool,
    pub capacity: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 100,
        }
    }
}

/// Selection cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

#[derive(Debug, Default)]
struct SelectionCache {
    entries: HashMap<String, Vec<Arc<RecoveryStrategy>>>,
    /// Insertion order, oldest first
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
}

impl SelectionCache {
    fn insert(&mut self, key: String, value: Vec<Arc<RecoveryStrategy>>, capacity: usize) {
        if self.entries.insert(key.clone(), value).is_none() {
            self.order.push_back(key);
        }
        while self.entries.len() > capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

/// Registered recovery strategies plus the selection cache.
#[derive(Debug, Default)]
pub struct StrategyCatalog {
    strategies: RwLock<Vec<Arc<RecoveryStrategy>>>,
    cache: Mutex<SelectionCache>,
}

impl StrategyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategies(strategies: impl IntoIterator<Item = RecoveryStrategy>) -> Self {
        let catalog = Self::new();
        for strategy in strategies {
            catalog.register(strategy);
        }
        catalog
    }

    /// Register a strategy, replacing any existing one with the same id.
    ///
    /// Invalidates the selection cache.
    pub fn register(&self, strategy: RecoveryStrategy) {
        let strategy = Arc::new(strategy);
        {
            let mut strategies = self.strategies.write();
            match strategies.iter().position(|s| s.id == strategy.id) {
                Some(index) => strategies[index] = strategy,
                None => strategies.push(strategy),
            }
        }
        self.cache.lock().clear();
    }

    pub fn get(&self, id: &str) -> Option<Arc<RecoveryStrategy>> {
        self.strategies.read().iter().find(|s| s.id == id).cloned()
    }

    pub fn strategies(&self) -> Vec<Arc<RecoveryStrategy>> {
        self.strategies.read().clone()
    }

    pub fn len(&self) -> usize {
        self.strategies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.read().is_empty()
    }

    /// Candidate strategies for `error`, sorted by ascending priority and then
    /// descending seed success rate. Empty when nothing matches.
    pub fn select(&self, error: &RaisedError, cache: CachePolicy) -> Vec<Arc<RecoveryStrategy>> {
        let key = error.cache_key();

        if cache.enabled {
            let mut guard = self.cache.lock();
            if let Some(hit) = guard.entries.get(&key).cloned() {
                guard.hits += 1;
                debug!(key = %key, "Strategy selection cache hit");
                return hit;
            }
            guard.misses += 1;
        }

        let selected = self.rank(error);

        if cache.enabled {
            self.cache
                .lock()
                .insert(key, selected.clone(), cache.capacity);
        }
        selected
    }

    fn rank(&self, error: &RaisedError) -> Vec<Arc<RecoveryStrategy>> {
        let strategies = self.strategies.read();

        let mut selected: Vec<Arc<RecoveryStrategy>> = match error.kind {
            Some(kind) => strategies
                .iter()
                .filter(|s| s.handles(kind))
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        if selected.is_empty() {
            let type_lower = error.type_name.to_lowercase();
            let message_lower = error.message.to_lowercase();
            selected = strategies
                .iter()
                .filter(|s| s.matches_keywords(&type_lower, &message_lower))
                .cloned()
                .collect();
        }

        selected.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(b.success_rate.total_cmp(&a.success_rate))
        });
        selected
    }

    pub fn cache_stats(&self) -> CacheStats {
        let cache = self.cache.lock();
        CacheStats {
            hits: cache.hits,
            misses: cache.misses,
            entries: cache.entries.len(),
        }
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }
}
