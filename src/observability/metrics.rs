//! Host metrics sampled alongside each recovery attempt

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use sysinfo::System;

/// Resource snapshot attached to a recovery attempt. Informational only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttemptMetrics {
    /// Global CPU usage (percent)
    pub cpu_usage: Option<f32>,
    /// Used memory (bytes)
    pub memory_used_bytes: Option<u64>,
    pub network_latency_ms: Option<f64>,
    /// Wall time of the action (ms)
    pub response_time_ms: f64,
}

impl AttemptMetrics {
    pub fn response_only(response_time: Duration) -> Self {
        Self {
            response_time_ms: response_time.as_secs_f64() * 1000.0,
            ..Default::default()
        }
    }
}

/// Source of [`AttemptMetrics`].
pub trait MetricsProbe: Send + Sync {
    fn sample(&self, response_time: Duration) -> AttemptMetrics;
}

/// Records response time only.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetricsProbe;

impl MetricsProbe for NullMetricsProbe {
    fn sample(&self, response_time: Duration) -> AttemptMetrics {
        AttemptMetrics::response_only(response_time)
    }
}

/// Samples CPU and memory from the host via sysinfo.
pub struct SystemMetricsProbe {
    system: Mutex<System>,
}

impl SystemMetricsProbe {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a delta, so prime it once
        system.refresh_cpu_usage();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl Default for SystemMetricsProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsProbe for SystemMetricsProbe {
    fn sample(&self, response_time: Duration) -> AttemptMetrics {
        let mut system = self.system.lock();
        system.refresh_cpu_usage();
        system.refresh_memory();
        AttemptMetrics {
            cpu_usage: Some(system.global_cpu_usage()),
            memory_used_bytes: Some(system.used_memory()),
            network_latency_ms: None,
            response_time_ms: response_time.as_secs_f64() * 1000.0,
        }
    }
}
