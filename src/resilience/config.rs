//! Circuit breaker configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Thresholds for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Failures inside the monitoring window that open the circuit
    pub failure_threshold: u32,
    /// Cooldown spent open before a probe call is let through
    pub timeout: Duration,
    /// Sliding window outcomes are counted in
    pub monitoring_window: Duration,
    /// Recent failure rate at or above which the breaker reports unhealthy
    pub failure_rate_threshold: f64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(60),
            monitoring_window: Duration::from_secs(60),
            failure_rate_threshold: 0.5,
        }
    }
}
