//! Exponential retry backoff with symmetric jitter

use std::time::Duration;

use crate::config::RecoveryConfig;

/// Retry delay policy
///
/// The delay after the `n`-th recorded failure is `base × 2^(n−1)`, capped at
/// `max`, then jittered by up to ±`jitter_factor` and capped again.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max: Duration,
    pub jitter_factor: f64,
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration, jitter_factor: f64) -> Self {
        Self {
            base,
            max,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &RecoveryConfig) -> Self {
        Self::new(config.base_delay(), config.max_delay(), config.jitter_factor)
    }

    /// Delay before the retry that follows failure number `failures`, without jitter
    pub fn nominal_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1);
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Jittered delay before the retry that follows failure number `failures`
    pub fn delay(&self, failures: u32) -> Duration {
        self.delay_with_unit(failures, fastrand::f64())
    }

    /// Jittered delay for a given unit sample in `[0, 1)`; 0.5 means no jitter
    pub fn delay_with_unit(&self, failures: u32, unit: f64) -> Duration {
        let nominal = self.nominal_delay(failures);
        let offset = (unit.clamp(0.0, 1.0) * 2.0 - 1.0) * self.jitter_factor;
        nominal.mul_f64(1.0 + offset).min(self.max)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&RecoveryConfig::default())
    }
}
