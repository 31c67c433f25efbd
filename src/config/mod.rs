//! # Docflow Configuration System
//!
//! Layered configuration for the scheduling core. Every tick interval,
//! threshold and bound lives here rather than in code, so tests can run the
//! monitors and backoff at accelerated speed.
//!
//! ## Sources (later wins)
//!
//! 1. Built-in defaults
//! 2. `config/docflow.toml`
//! 3. `config/docflow.<environment>.toml`
//! 4. `DOCFLOW__<SECTION>__<FIELD>` environment variables
//!
//! ## Usage
//!
//! ```rust,no_run
//! use docflow_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let timeout = manager.config().recovery.job_timeout();
//! let threshold = manager.config().queue.large_file_threshold_bytes;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::Lane;
use crate::resilience::CircuitBreakerConfig;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring docflow.toml
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DocflowConfig {
    /// Lane selection and queue-level recommendations
    pub queue: QueueConfig,

    /// Per-lane concurrency caps
    pub lanes: LanesConfig,

    /// Execution slot timing
    pub worker: WorkerConfig,

    /// Failure detection and retry policy
    pub recovery: RecoveryConfig,

    /// Breaker guarding the retry requeue path
    pub circuit_breaker: CircuitBreakerSettings,

    /// Logging output
    pub telemetry: TelemetryConfig,
}

impl DocflowConfig {
    /// Validate cross-field constraints, rejecting configurations the core cannot honor
    pub fn validate(&self) -> ConfigResult<()> {
        for lane in Lane::ALL {
            if self.lanes.concurrency(lane) == 0 {
                return Err(ConfigurationError::invalid_value(
                    format!("lanes.{}.concurrency", lane.name()),
                    0,
                    "every lane needs at least one execution slot",
                ));
            }
        }

        if self.queue.large_file_threshold_bytes == 0 {
            return Err(ConfigurationError::invalid_value(
                "queue.large_file_threshold_bytes",
                0,
                "threshold must be positive",
            ));
        }

        if !(0.0..=1.0).contains(&self.queue.premium_load_threshold) {
            return Err(ConfigurationError::invalid_value(
                "queue.premium_load_threshold",
                self.queue.premium_load_threshold,
                "must be within [0, 1]",
            ));
        }

        let recovery = &self.recovery;
        if recovery.max_retries == 0 {
            return Err(ConfigurationError::invalid_value(
                "recovery.max_retries",
                0,
                "at least one attempt is required",
            ));
        }
        if recovery.health_check_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "recovery.health_check_interval_ms",
                0,
                "tick interval must be positive",
            ));
        }
        if recovery.base_delay_ms > recovery.max_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "recovery.base_delay_ms",
                recovery.base_delay_ms,
                format!("exceeds max_delay_ms ({})", recovery.max_delay_ms),
            ));
        }
        if !(0.0..1.0).contains(&recovery.jitter_factor) {
            return Err(ConfigurationError::invalid_value(
                "recovery.jitter_factor",
                recovery.jitter_factor,
                "must be within [0, 1)",
            ));
        }

        if recovery.tombstone_retention_ms < recovery.job_timeout_ms {
            return Err(ConfigurationError::invalid_value(
                "recovery.tombstone_retention_ms",
                recovery.tombstone_retention_ms,
                format!("must cover at least job_timeout_ms ({})", recovery.job_timeout_ms),
            ));
        }

        if self.worker.shutdown_grace_period_ms > recovery.job_timeout_ms {
            return Err(ConfigurationError::invalid_value(
                "worker.shutdown_grace_period_ms",
                self.worker.shutdown_grace_period_ms,
                "grace period must not exceed recovery.job_timeout_ms",
            ));
        }
        if self.worker.telemetry_interval_ms == 0 || self.worker.progress_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.telemetry_interval_ms",
                self.worker.telemetry_interval_ms,
                "telemetry and progress intervals must be positive",
            ));
        }
        if self.worker.telemetry_interval() >= recovery.heartbeat_timeout() {
            return Err(ConfigurationError::invalid_value(
                "worker.telemetry_interval_ms",
                self.worker.telemetry_interval_ms,
                "heartbeats must arrive faster than three health-check ticks",
            ));
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigurationError::invalid_value(
                "circuit_breaker.failure_threshold",
                0,
                "must be at least 1",
            ));
        }

        Ok(())
    }
}

/// Lane selection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Payloads strictly larger than this go to the large lane
    pub large_file_threshold_bytes: u64,
    /// Below this normalised system load the premium lane gets a second slot
    pub premium_load_threshold: f64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            large_file_threshold_bytes: 50 * 1024 * 1024,
            premium_load_threshold: 0.7,
        }
    }
}

/// Concurrency cap for a single lane
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LaneConfig {
    pub concurrency: usize,
}

/// Concurrency caps for every lane
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LanesConfig {
    pub premium: LaneConfig,
    pub normal: LaneConfig,
    pub large: LaneConfig,
}

impl LanesConfig {
    pub fn concurrency(&self, lane: Lane) -> usize {
        match lane {
            Lane::Premium => self.premium.concurrency,
            Lane::Normal => self.normal.concurrency,
            Lane::Large => self.large.concurrency,
        }
    }
}

impl Default for LanesConfig {
    fn default() -> Self {
        Self {
            premium: LaneConfig { concurrency: 3 },
            normal: LaneConfig { concurrency: 2 },
            large: LaneConfig { concurrency: 1 },
        }
    }
}

/// Execution slot timing
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Telemetry snapshot and heartbeat cadence
    pub telemetry_interval_ms: u64,
    /// Progress notification cadence while a job runs
    pub progress_interval_ms: u64,
    /// Sleep between empty dequeue attempts
    pub poll_interval_ms: u64,
    /// Bounded wait for an in-flight job during graceful shutdown
    pub shutdown_grace_period_ms: u64,
    /// Assumed processing time before a slot has its own history
    pub expected_processing_ms: u64,
    /// Number of recent jobs in the rolling processing-time average
    pub rolling_window: usize,
}

impl WorkerConfig {
    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry_interval_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace_period(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_period_ms)
    }

    pub fn expected_processing_time(&self) -> Duration {
        Duration::from_millis(self.expected_processing_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            telemetry_interval_ms: 10_000,
            progress_interval_ms: 2_000,
            poll_interval_ms: 500,
            shutdown_grace_period_ms: 60_000,
            expected_processing_ms: 30_000,
            rolling_window: 50,
        }
    }
}

/// Failure detection and retry policy
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Monitor tick; heartbeat timeout is three ticks
    pub health_check_interval_ms: u64,
    /// Hard ceiling on a single job's age
    pub job_timeout_ms: u64,
    /// Failures after which a job is permanently failed
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Relative jitter applied to every retry delay
    pub jitter_factor: f64,
    /// How long permanently failed and recovered job ids are remembered
    pub tombstone_retention_ms: u64,
}

impl RecoveryConfig {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        self.health_check_interval() * 3
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }

    /// A job with no progress for this long is considered stalled
    pub fn stall_timeout(&self) -> Duration {
        self.job_timeout() / 2
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn tombstone_retention(&self) -> Duration {
        Duration::from_millis(self.tombstone_retention_ms)
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            health_check_interval_ms: 10_000,
            job_timeout_ms: 300_000,
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            jitter_factor: 0.1,
            tombstone_retention_ms: 3_600_000,
        }
    }
}

/// File representation of the circuit breaker settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub failure_threshold: u32,
    /// Cooldown before a probe is allowed
    pub timeout_ms: u64,
    /// Sliding window failures are counted in
    pub monitoring_window_ms: u64,
    /// Recent failure rate at or above which the breaker reports unhealthy
    pub failure_rate_threshold: f64,
}

impl CircuitBreakerSettings {
    pub fn to_circuit_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            timeout: Duration::from_millis(self.timeout_ms),
            monitoring_window: Duration::from_millis(self.monitoring_window_ms),
            failure_rate_threshold: self.failure_rate_threshold,
        }
    }
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        let defaults = CircuitBreakerConfig::default();
        Self {
            failure_threshold: defaults.failure_threshold,
            timeout_ms: defaults.timeout.as_millis() as u64,
            monitoring_window_ms: defaults.monitoring_window.as_millis() as u64,
            failure_rate_threshold: defaults.failure_rate_threshold,
        }
    }
}

/// Logging output settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Overrides the environment's default filter when set
    pub log_level: Option<String>,
    /// Emit JSON lines instead of human-readable output
    pub json_logs: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DocflowConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.recovery.heartbeat_timeout(), Duration::from_secs(30));
        assert_eq!(config.recovery.stall_timeout(), Duration::from_secs(150));
        assert_eq!(config.lanes.concurrency(Lane::Large), 1);
    }

    #[test]
    fn test_rejects_base_delay_above_max() {
        let mut config = DocflowConfig::default();
        config.recovery.base_delay_ms = 120_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("recovery.base_delay_ms"));
    }

    #[test]
    fn test_rejects_zero_lane_concurrency() {
        let mut config = DocflowConfig::default();
        config.lanes.premium.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_grace_period_longer_than_job_timeout() {
        let mut config = DocflowConfig::default();
        config.worker.shutdown_grace_period_ms = config.recovery.job_timeout_ms + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_tombstone_retention_shorter_than_job_timeout() {
        let mut config = DocflowConfig::default();
        config.recovery.tombstone_retention_ms = config.recovery.job_timeout_ms - 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("recovery.tombstone_retention_ms"));
    }

    #[test]
    fn test_breaker_settings_convert_to_durations() {
        let settings = CircuitBreakerSettings {
            failure_threshold: 3,
            timeout_ms: 1_000,
            monitoring_window_ms: 5_000,
            failure_rate_threshold: 0.25,
        };
        let config = settings.to_circuit_breaker_config();
        assert_eq!(config.timeout, Duration::from_secs(1));
        assert_eq!(config.monitoring_window, Duration::from_secs(5));
    }
}
