//! Shared helpers for the integration suites

#![allow(dead_code)]

use async_trait::async_trait;
use docflow_core::config::DocflowConfig;
use docflow_core::models::{Job, JobSubmission, Lane};
use docflow_core::recovery::RecoveryEvent;
use docflow_core::resilience::{CircuitBreaker, CircuitBreakerConfig};
use docflow_core::worker::{JobProcessor, ProcessingError};
use docflow_core::FailureRecoveryManager;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const MIB: u64 = 1024 * 1024;

/// Configuration with every tick and bound shrunk for tests
pub fn fast_config() -> DocflowConfig {
    let mut config = DocflowConfig::default();
    config.lanes.premium.concurrency = 2;
    config.lanes.normal.concurrency = 1;
    config.lanes.large.concurrency = 1;

    config.worker.telemetry_interval_ms = 100;
    config.worker.progress_interval_ms = 50;
    config.worker.poll_interval_ms = 10;
    config.worker.shutdown_grace_period_ms = 500;
    config.worker.expected_processing_ms = 200;

    config.recovery.health_check_interval_ms = 100;
    config.recovery.job_timeout_ms = 2_000;
    config.recovery.max_retries = 3;
    config.recovery.base_delay_ms = 10;
    config.recovery.max_delay_ms = 200;
    config.recovery.jitter_factor = 0.1;

    config.circuit_breaker.failure_threshold = 3;
    config.circuit_breaker.timeout_ms = 1_000;
    config.circuit_breaker.monitoring_window_ms = 5_000;
    config
}

pub fn submission(user: &str, tier: &str, size_bytes: u64) -> JobSubmission {
    JobSubmission::new(user, format!("uploads/{user}.pdf"), tier, size_bytes)
}

pub fn job(user: &str, tier: &str, lane: Lane, priority: u8) -> Job {
    Job::from_submission(submission(user, tier, 4_096), lane, priority)
}

/// Recovery manager wired to a fresh breaker, returning its event stream
pub fn recovery_manager(
    config: &DocflowConfig,
) -> (FailureRecoveryManager, mpsc::UnboundedReceiver<RecoveryEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let breaker = Arc::new(CircuitBreaker::new(
        "test_requeue",
        config.circuit_breaker.to_circuit_breaker_config(),
    ));
    (
        FailureRecoveryManager::new(config.recovery.clone(), breaker, tx),
        rx,
    )
}

pub fn breaker(threshold: u32, timeout: Duration) -> CircuitBreaker {
    CircuitBreaker::new(
        "test_breaker",
        CircuitBreakerConfig {
            failure_threshold: threshold,
            timeout,
            monitoring_window: Duration::from_secs(60),
            failure_rate_threshold: 0.5,
        },
    )
}

pub fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// What the scripted processor does with a given payload
#[derive(Debug, Clone)]
pub enum Script {
    Succeed,
    /// Fail this many times, then succeed
    FailTimes(u32),
    AlwaysFail,
    Panic,
    /// Never return
    Hang,
}

/// Processor whose behaviour is scripted per payload reference
#[derive(Debug)]
pub struct ScriptedProcessor {
    duration: Duration,
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<HashMap<String, u32>>,
    total: AtomicUsize,
}

impl ScriptedProcessor {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            total: AtomicUsize::new(0),
        }
    }

    pub fn script(&self, payload_ref: impl Into<String>, script: Script) {
        self.scripts.lock().insert(payload_ref.into(), script);
    }

    pub fn calls_for(&self, payload_ref: &str) -> u32 {
        self.calls.lock().get(payload_ref).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }
}

#[async_trait]
impl JobProcessor for ScriptedProcessor {
    async fn process(&self, job: &Job) -> Result<serde_json::Value, ProcessingError> {
        self.total.fetch_add(1, Ordering::AcqRel);
        let attempt = {
            let mut calls = self.calls.lock();
            let count = calls.entry(job.payload_ref.clone()).or_insert(0);
            *count += 1;
            *count
        };
        let script = self
            .scripts
            .lock()
            .get(&job.payload_ref)
            .cloned()
            .unwrap_or(Script::Succeed);

        tokio::time::sleep(self.duration).await;

        match script {
            Script::Succeed => Ok(serde_json::json!({ "output": format!("{}.docx", job.payload_ref) })),
            Script::FailTimes(n) if attempt <= n => {
                Err(ProcessingError::Failed(format!("scripted failure {attempt}")))
            }
            Script::FailTimes(_) => Ok(serde_json::json!({ "attempt": attempt })),
            Script::AlwaysFail => Err(ProcessingError::Failed("converter rejected payload".to_string())),
            Script::Panic => panic!("converter crashed"),
            Script::Hang => std::future::pending().await,
        }
    }
}
