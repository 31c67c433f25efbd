//! Circuit breaker metrics snapshot

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::CircuitState;

/// Point-in-time view of a circuit breaker's counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerMetrics {
    /// Calls that actually ran the protected operation
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Calls rejected without running the operation
    pub rejected_count: u64,
    /// Number of times the circuit opened
    pub trips: u64,
    pub current_state: CircuitState,
    /// Failure rate inside the monitoring window
    pub failure_rate: f64,
    /// Calls observed inside the monitoring window
    pub recent_calls: u64,
    pub total_duration: Duration,
    pub average_duration: Duration,
    pub healthy: bool,
}

impl CircuitBreakerMetrics {
    pub fn new() -> Self {
        Self {
            total_calls: 0,
            success_count: 0,
            failure_count: 0,
            rejected_count: 0,
            trips: 0,
            current_state: CircuitState::Closed,
            failure_rate: 0.0,
            recent_calls: 0,
            total_duration: Duration::ZERO,
            average_duration: Duration::ZERO,
            healthy: true,
        }
    }
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
