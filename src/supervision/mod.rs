//! Attempt gating and retry pacing
//!
//! - [`circuit_breaker`]: per `(error type, strategy)` breakers
//! - [`backoff`]: delay between retries

pub mod backoff;
pub mod circuit_breaker;

pub use backoff::BackoffPolicy;
pub use circuit_breaker::{
    BreakerPolicy, CircuitBreakerManager, CircuitBreakerState, CircuitState,
};
