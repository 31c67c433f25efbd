//! # Scheduling System Bootstrap
//!
//! Wires router, worker pool, recovery manager and coordinator together from
//! a [`ConfigManager`] plus the external collaborators, replays jobs left
//! pending by a previous run and shuts everything down in dependency order.
//!
//! ## Startup order
//!
//! 1. coordinator dispatch loop (startup recovery needs it to answer requeues)
//! 2. startup recovery of persisted pending jobs
//! 3. recovery monitor
//! 4. worker slots

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::{ConfigManager, DocflowConfig};
use crate::coordinator::RecoveryCoordinator;
use crate::error::{DocflowError, Result};
use crate::logging::init_structured_logging;
use crate::models::{JobHandle, JobSubmission, Lane};
use crate::queue::{sample_system_load, DurableQueue, LaneStats, PriorityQueueRouter, QueueConfiguration};
use crate::recovery::{FailureRecoveryManager, RecoveryReport, RecoveryStats};
use crate::resilience::CircuitBreaker;
use crate::services::{JobStore, Notifier, WorkerLifecycle};
use crate::worker::pool::ShutdownSummary;
use crate::worker::{JobProcessor, WorkerPool, WorkerSnapshot};

/// Name of the breaker guarding the retry requeue path
pub const REQUEUE_BREAKER_NAME: &str = "retry_requeue";

/// External collaborators the core produces to and consumes from
#[derive(Clone)]
pub struct Collaborators {
    pub queue: Arc<dyn DurableQueue>,
    pub processor: Arc<dyn JobProcessor>,
    pub store: Arc<dyn JobStore>,
    pub notifier: Arc<dyn Notifier>,
}

/// Operator dashboard view across all components
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub environment: String,
    pub running: bool,
    pub lanes: Vec<LaneStats>,
    pub recommended: QueueConfiguration,
    pub recovery: RecoveryStats,
    pub workers: Vec<WorkerSnapshot>,
}

/// Running scheduling core
pub struct SchedulingSystem {
    config: DocflowConfig,
    environment: String,
    router: Arc<PriorityQueueRouter>,
    pool: Arc<WorkerPool>,
    manager: FailureRecoveryManager,
    coordinator: Arc<RecoveryCoordinator>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SchedulingSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulingSystem")
            .field("environment", &self.environment)
            .field("pool", &self.pool)
            .field("running", &self.is_running())
            .finish()
    }
}

impl SchedulingSystem {
    /// Build and start every component, returning the startup recovery report
    #[instrument(skip(config_manager, collaborators), fields(environment = %config_manager.environment()))]
    pub async fn start(
        config_manager: &ConfigManager,
        collaborators: Collaborators,
    ) -> Result<(Self, RecoveryReport)> {
        let config = config_manager.config().clone();
        config.validate()?;
        init_structured_logging(&config.telemetry);

        info!("🚀 BOOTSTRAP: starting scheduling core");

        let (worker_tx, worker_rx) = mpsc::unbounded_channel();
        let (recovery_tx, recovery_rx) = mpsc::unbounded_channel();

        let router = Arc::new(PriorityQueueRouter::new(
            Arc::clone(&collaborators.queue),
            config.queue.clone(),
            config.lanes.clone(),
            config.worker.expected_processing_time(),
        ));

        let breaker = Arc::new(CircuitBreaker::new(
            REQUEUE_BREAKER_NAME,
            config.circuit_breaker.to_circuit_breaker_config(),
        ));
        let manager = FailureRecoveryManager::new(config.recovery.clone(), breaker, recovery_tx);

        let pool = Arc::new(WorkerPool::new(
            collaborators.queue,
            collaborators.processor,
            worker_tx,
            config.worker.clone(),
            config.lanes.clone(),
        ));

        let lifecycle: Arc<dyn WorkerLifecycle> = Arc::clone(&pool) as Arc<dyn WorkerLifecycle>;
        let coordinator = Arc::new(RecoveryCoordinator::new(
            Arc::clone(&router),
            manager.clone(),
            collaborators.store,
            collaborators.notifier,
            lifecycle,
        ));

        let dispatch = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.run(worker_rx, recovery_rx).await })
        };

        let system = Self {
            config,
            environment: config_manager.environment().to_string(),
            router,
            pool,
            manager,
            coordinator,
            dispatch: Mutex::new(Some(dispatch)),
        };

        let report = match system.coordinator.recover_on_startup().await {
            Ok(report) => report,
            Err(e) => {
                system.coordinator.stop();
                return Err(e);
            }
        };

        system.manager.start_monitoring()?;
        let workers = system.pool.start()?;

        info!(
            workers = workers.len(),
            recovered = report.requeued,
            permanently_failed = report.permanently_failed,
            "✅ BOOTSTRAP: scheduling core running"
        );
        Ok((system, report))
    }

    pub async fn submit(&self, submission: JobSubmission) -> Result<JobHandle> {
        self.coordinator.submit(submission).await
    }

    /// Cancel a job that no worker has picked up yet
    pub async fn cancel(&self, job_id: Uuid, lane: Lane) -> Result<bool> {
        self.router.cancel(job_id, lane).await
    }

    pub fn config(&self) -> &DocflowConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn router(&self) -> &Arc<PriorityQueueRouter> {
        &self.router
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn manager(&self) -> &FailureRecoveryManager {
        &self.manager
    }

    pub fn is_running(&self) -> bool {
        self.dispatch
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub async fn status(&self) -> Result<SystemStatus> {
        Ok(SystemStatus {
            environment: self.environment.clone(),
            running: self.is_running(),
            lanes: self.router.stats().await?,
            recommended: self.router.queue_configuration(sample_system_load()),
            recovery: self.manager.recovery_stats(),
            workers: self.pool.telemetry().snapshots(),
        })
    }

    /// Stop workers within the configured grace period, then the monitor and
    /// the dispatch loop
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<ShutdownSummary> {
        let grace = self.config.worker.shutdown_grace_period();
        info!(grace_ms = grace.as_millis() as u64, "🛑 BOOTSTRAP: shutting down");

        let summary = self.pool.shutdown(grace).await;
        if let Err(e) = self.manager.stop_monitoring(Duration::from_secs(5)).await {
            warn!(error = %e, "BOOTSTRAP: recovery monitor did not stop cleanly");
        }
        let cancelled = self.manager.cancel_pending_retries();
        if cancelled > 0 {
            info!(cancelled, "BOOTSTRAP: pending retries left to startup recovery");
        }

        self.coordinator.stop();
        let dispatch = self.dispatch.lock().take();
        if let Some(mut handle) = dispatch {
            if tokio::time::timeout(Duration::from_secs(5), &mut handle)
                .await
                .is_err()
            {
                handle.abort();
                return Err(DocflowError::Timeout(
                    "coordinator dispatch loop did not stop".to_string(),
                ));
            }
        }

        info!(
            graceful = summary.graceful,
            forced = summary.forced,
            "✅ BOOTSTRAP: shutdown complete"
        );
        Ok(summary)
    }
}
