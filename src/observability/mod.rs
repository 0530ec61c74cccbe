//! Observability module
//!
//! - Tracing subscriber setup and log sanitizing
//! - Host metrics sampled per recovery attempt

pub mod metrics;
pub mod telemetry;

pub use metrics::{AttemptMetrics, MetricsProbe, NullMetricsProbe, SystemMetricsProbe};
