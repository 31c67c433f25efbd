//! # Circuit Breaker Implementation
//!
//! Fault isolation for operations that can fail systemically. Three states:
//! Closed (normal operation), Open (failing fast) and Half-Open (a single
//! probe call tests recovery).
//!
//! Every admitted call is stamped with the breaker's generation. A transition
//! bumps the generation, so an outcome that arrives after the state moved on
//! updates the counters but never drives another transition. A call admitted
//! as a probe is therefore never also counted as a normal call.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::{CircuitBreakerConfig, CircuitBreakerMetrics};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed = 0,
    /// Failure mode - all calls fail fast without executing
    Open = 1,
    /// Testing recovery - exactly one probe call is allowed
    HalfOpen = 2,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open,
        }
    }
}

/// Errors that can occur during circuit breaker operation
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open (or a probe is already in flight), call rejected
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },

    /// Operation ran, failed, and was recorded
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

impl<E> CircuitBreakerError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CircuitBreakerError::CircuitOpen { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdmissionKind {
    Normal,
    Probe,
}

#[derive(Debug, Clone, Copy)]
struct Admission {
    kind: AdmissionKind,
    generation: u64,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    generation: u64,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    /// (finished_at, succeeded) for calls inside the monitoring window
    recent: VecDeque<(Instant, bool)>,
    metrics: CircuitBreakerMetrics,
}

/// Core circuit breaker implementation
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging and metrics
    name: String,

    /// Lock-free mirror of the current state for cheap reads
    state: AtomicU8,

    /// Configuration parameters
    config: CircuitBreakerConfig,

    /// State machine and counters, single writer at a time
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            timeout_ms = config.timeout.as_millis() as u64,
            monitoring_window_ms = config.monitoring_window.as_millis() as u64,
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                generation: 0,
                opened_at: None,
                probe_in_flight: false,
                recent: VecDeque::new(),
                metrics: CircuitBreakerMetrics::new(),
            }),
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Get component name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Execute an operation with circuit breaker protection
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(admission) = self.admit() else {
            debug!(component = %self.name, "⛔ Call rejected by open circuit");
            return Err(CircuitBreakerError::CircuitOpen {
                component: self.name.clone(),
            });
        };

        let mut guard = OutcomeGuard {
            breaker: self,
            admission,
            started: Instant::now(),
            settled: false,
        };

        let result = operation().await;
        guard.settle(result.is_ok());

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    /// Execute an operation, substituting the fallback's value when the call
    /// is rejected or fails
    pub async fn call_with_fallback<F, Fut, T, E, G, GFut>(&self, operation: F, fallback: G) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        G: FnOnce(CircuitBreakerError<E>) -> GFut,
        GFut: Future<Output = T>,
    {
        match self.call(operation).await {
            Ok(value) => value,
            Err(err) => {
                let rejected = err.is_circuit_open();
                debug!(component = %self.name, rejected, "↪️ Using fallback");
                fallback(err).await
            }
        }
    }

    /// Decide whether a call may run, transitioning Open -> HalfOpen when the
    /// cooldown has elapsed
    fn admit(&self) -> Option<Admission> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Some(Admission {
                kind: AdmissionKind::Normal,
                generation: inner.generation,
            }),
            CircuitState::Open => {
                let cooled_down = inner
                    .opened_at
                    .map(|opened| opened.elapsed() >= self.config.timeout)
                    .unwrap_or(true);
                if cooled_down {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.probe_in_flight = true;
                    Some(Admission {
                        kind: AdmissionKind::Probe,
                        generation: inner.generation,
                    })
                } else {
                    inner.metrics.rejected_count += 1;
                    None
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    inner.metrics.rejected_count += 1;
                    None
                } else {
                    inner.probe_in_flight = true;
                    Some(Admission {
                        kind: AdmissionKind::Probe,
                        generation: inner.generation,
                    })
                }
            }
        }
    }

    fn record(&self, admission: Admission, success: bool, duration: Duration) {
        let mut inner = self.inner.lock();
        let now = Instant::now();

        inner.metrics.total_calls += 1;
        inner.metrics.total_duration += duration;
        if success {
            inner.metrics.success_count += 1;
        } else {
            inner.metrics.failure_count += 1;
        }
        inner.recent.push_back((now, success));
        self.prune(&mut inner, now);

        if admission.generation != inner.generation {
            debug!(
                component = %self.name,
                success,
                "Outcome from a previous breaker cycle recorded without transition"
            );
            return;
        }

        match (admission.kind, inner.state) {
            (AdmissionKind::Probe, CircuitState::HalfOpen) => {
                inner.probe_in_flight = false;
                if success {
                    self.transition(&mut inner, CircuitState::Closed);
                } else {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            (AdmissionKind::Normal, CircuitState::Closed) if !success => {
                let failures = inner.recent.iter().filter(|(_, ok)| !ok).count() as u32;
                warn!(
                    component = %self.name,
                    failures_in_window = failures,
                    failure_threshold = self.config.failure_threshold,
                    duration_ms = duration.as_millis() as u64,
                    "🔴 Operation failed"
                );
                if failures >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            _ => {}
        }
    }

    fn prune(&self, inner: &mut BreakerInner, now: Instant) {
        while let Some((at, _)) = inner.recent.front() {
            if now.duration_since(*at) > self.config.monitoring_window {
                inner.recent.pop_front();
            } else {
                break;
            }
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        inner.state = to;
        inner.generation += 1;
        self.state.store(to as u8, Ordering::Release);

        match to {
            CircuitState::Closed => {
                inner.opened_at = None;
                inner.probe_in_flight = false;
                inner.recent.clear();
                info!(
                    component = %self.name,
                    total_calls = inner.metrics.total_calls,
                    "🟢 Circuit breaker closed (recovered)"
                );
            }
            CircuitState::Open => {
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
                inner.metrics.trips += 1;
                error!(
                    component = %self.name,
                    failure_threshold = self.config.failure_threshold,
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "🔴 Circuit breaker opened (failing fast)"
                );
            }
            CircuitState::HalfOpen => {
                info!(component = %self.name, "🟡 Circuit breaker half-open (testing recovery)");
            }
        }
    }

    /// Force circuit to open state (for emergency situations)
    pub fn force_open(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced open");
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Open);
    }

    /// Force circuit to closed state (for emergency recovery)
    pub fn force_closed(&self) {
        warn!(component = %self.name, "🚨 Circuit breaker forced closed");
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Closed);
    }

    /// Get current metrics snapshot
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let mut inner = self.inner.lock();
        self.prune(&mut inner, Instant::now());

        let mut snapshot = inner.metrics.clone();
        snapshot.current_state = inner.state;
        snapshot.recent_calls = inner.recent.len() as u64;
        snapshot.failure_rate = recent_failure_rate(&inner.recent);
        if snapshot.total_calls > 0 {
            snapshot.average_duration = snapshot.total_duration / snapshot.total_calls as u32;
        }
        snapshot.healthy = inner.state != CircuitState::Open
            && snapshot.failure_rate < self.config.failure_rate_threshold;
        snapshot
    }

    /// Healthy iff not open and the recent failure rate is below threshold
    pub fn is_healthy(&self) -> bool {
        self.metrics().healthy
    }
}

fn recent_failure_rate(recent: &VecDeque<(Instant, bool)>) -> f64 {
    if recent.is_empty() {
        return 0.0;
    }
    let failures = recent.iter().filter(|(_, ok)| !ok).count();
    failures as f64 / recent.len() as f64
}

/// Records the outcome of an admitted call; a call dropped before it
/// finished counts as a failure so a cancelled probe cannot wedge half-open
struct OutcomeGuard<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    started: Instant,
    settled: bool,
}

impl OutcomeGuard<'_> {
    fn settle(&mut self, success: bool) {
        self.settled = true;
        self.breaker
            .record(self.admission, success, self.started.elapsed());
    }
}

impl Drop for OutcomeGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker
                .record(self.admission, false, self.started.elapsed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn config(threshold: u32, timeout_ms: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: threshold,
            timeout: Duration::from_millis(timeout_ms),
            monitoring_window: Duration::from_secs(60),
            failure_rate_threshold: 0.5,
        }
    }

    #[tokio::test]
    async fn test_circuit_breaker_normal_operation() {
        let circuit = CircuitBreaker::new("test", config(3, 100));

        assert_eq!(circuit.state(), CircuitState::Closed);

        let result = circuit.call(|| async { Ok::<_, String>("success") }).await;
        assert!(result.is_ok());

        let metrics = circuit.metrics();
        assert_eq!(metrics.total_calls, 1);
        assert_eq!(metrics.success_count, 1);
        assert_eq!(metrics.failure_count, 0);
        assert!(metrics.healthy);
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_on_failures() {
        let circuit = CircuitBreaker::new("test", config(2, 100));

        let _ = circuit.call(|| async { Err::<String, _>("error") }).await;
        assert_eq!(circuit.state(), CircuitState::Closed);

        let _ = circuit.call(|| async { Err::<String, _>("error") }).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        let result = circuit
            .call(|| async { Ok::<_, String>("should not execute") })
            .await;
        assert!(matches!(result, Err(CircuitBreakerError::CircuitOpen { .. })));
        assert_eq!(circuit.metrics().rejected_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_reopens_with_fresh_cooldown() {
        let circuit = CircuitBreaker::new("test", config(1, 1_000));

        let _ = circuit.call(|| async { Err::<(), _>("boom") }).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        let _ = circuit.call(|| async { Err::<(), _>("still down") }).await;
        assert_eq!(circuit.state(), CircuitState::Open);

        // the cooldown restarted at the failed probe
        tokio::time::sleep(Duration::from_millis(500)).await;
        let rejected = circuit.call(|| async { Ok::<_, &str>(()) }).await;
        assert!(rejected.unwrap_err().is_circuit_open());
        assert_eq!(circuit.metrics().trips, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_one_probe_in_half_open() {
        let circuit = Arc::new(CircuitBreaker::new("test", config(1, 100)));
        let _ = circuit.call(|| async { Err::<(), _>("boom") }).await;
        tokio::time::sleep(Duration::from_millis(150)).await;

        let invocations = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let probe = {
            let circuit = circuit.clone();
            let invocations = invocations.clone();
            tokio::spawn(async move {
                circuit
                    .call(|| async move {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        let _ = release_rx.await;
                        Ok::<_, &str>(())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(circuit.state(), CircuitState::HalfOpen);

        let concurrent = circuit
            .call(|| async {
                invocations.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(())
            })
            .await;
        assert!(concurrent.unwrap_err().is_circuit_open());

        release_tx.send(()).unwrap();
        assert!(probe.await.unwrap().is_ok());
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        assert_eq!(circuit.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_fallback_used_when_rejected_or_failed() {
        let circuit = CircuitBreaker::new("test", config(1, 10_000));

        let value = circuit
            .call_with_fallback(|| async { Err::<u32, _>("boom") }, |_| async { 7 })
            .await;
        assert_eq!(value, 7);
        assert_eq!(circuit.state(), CircuitState::Open);

        let value = circuit
            .call_with_fallback(
                || async { Ok::<u32, &str>(1) },
                |err| async move {
                    assert!(err.is_circuit_open());
                    9
                },
            )
            .await;
        assert_eq!(value, 9);
    }

    #[tokio::test]
    async fn test_force_operations() {
        let circuit = CircuitBreaker::new("test", config(1, 1_000));

        circuit.force_open();
        assert_eq!(circuit.state(), CircuitState::Open);
        assert!(!circuit.is_healthy());

        circuit.force_closed();
        assert_eq!(circuit.state(), CircuitState::Closed);
        assert!(circuit.is_healthy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_outside_window_do_not_accumulate() {
        let mut cfg = config(2, 1_000);
        cfg.monitoring_window = Duration::from_millis(500);
        let circuit = CircuitBreaker::new("test", cfg);

        let _ = circuit.call(|| async { Err::<(), _>("one") }).await;
        tokio::time::sleep(Duration::from_millis(600)).await;
        let _ = circuit.call(|| async { Err::<(), _>("two") }).await;

        assert_eq!(circuit.state(), CircuitState::Closed);
    }
}
