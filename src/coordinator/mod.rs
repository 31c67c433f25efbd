//! # Recovery Coordinator
//!
//! Glue between the scheduling core and the outside world. Worker events feed
//! the recovery manager; recovery events turn into persistence updates, user
//! notifications, router resubmissions and worker replacement requests.
//!
//! Both event streams are multiplexed by [`RecoveryCoordinator::run`]. Startup
//! recovery awaits requeue replies that `run` produces, so it must be driven
//! from a different task than the run loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, instrument, warn};

use crate::error::Result;
use crate::logging::log_job_operation;
use crate::models::{Job, JobHandle, JobStatus, JobSubmission};
use crate::queue::PriorityQueueRouter;
use crate::recovery::{FailureOutcome, FailureRecoveryManager, RecoveryEvent, RecoveryReport};
use crate::services::{
    JobStateUpdate, JobStore, Notifier, SystemAlert, UserNotification, WorkerLifecycle,
};
use crate::worker::WorkerEvent;

pub struct RecoveryCoordinator {
    router: Arc<PriorityQueueRouter>,
    manager: FailureRecoveryManager,
    store: Arc<dyn JobStore>,
    notifier: Arc<dyn Notifier>,
    lifecycle: Arc<dyn WorkerLifecycle>,
    running: AtomicBool,
    shutdown_notify: Notify,
}

impl std::fmt::Debug for RecoveryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryCoordinator")
            .field("router", &self.router)
            .field("manager", &self.manager)
            .field("running", &self.running.load(Ordering::Acquire))
            .finish()
    }
}

impl RecoveryCoordinator {
    pub fn new(
        router: Arc<PriorityQueueRouter>,
        manager: FailureRecoveryManager,
        store: Arc<dyn JobStore>,
        notifier: Arc<dyn Notifier>,
        lifecycle: Arc<dyn WorkerLifecycle>,
    ) -> Self {
        Self {
            router,
            manager,
            store,
            notifier,
            lifecycle,
            running: AtomicBool::new(true),
            shutdown_notify: Notify::new(),
        }
    }

    pub fn router(&self) -> &Arc<PriorityQueueRouter> {
        &self.router
    }

    pub fn manager(&self) -> &FailureRecoveryManager {
        &self.manager
    }

    /// Persist a new job and hand it to the router
    ///
    /// Infrastructure failures (persistence or durable queue) propagate to the
    /// caller. A job the queue refused is recorded as failed so startup
    /// recovery does not resurrect it.
    #[instrument(skip(self, submission), fields(user_id = %submission.user_id))]
    pub async fn submit(&self, submission: JobSubmission) -> Result<JobHandle> {
        let job = self.router.prepare(submission);
        self.store.save_job(&job).await?;

        match self.router.submit_prepared(job.clone()).await {
            Ok(handle) => {
                log_job_operation("submit", handle.job_id, handle.lane, None, "queued", None);
                Ok(handle)
            }
            Err(e) => {
                let update = JobStateUpdate::for_job(&job, JobStatus::Failed, None)
                    .with_failure_reason(e.to_string());
                if let Err(store_err) = self.store.update_job(update).await {
                    warn!(job_id = %job.id, error = %store_err, "COORDINATOR: could not record refused submission");
                }
                Err(e)
            }
        }
    }

    /// Read pending jobs from persistence and run a recovery pass over them
    #[instrument(skip(self))]
    pub async fn recover_on_startup(&self) -> Result<RecoveryReport> {
        let pending = self.store.pending_jobs().await?;
        info!(pending = pending.len(), "🔄 COORDINATOR: recovering pending jobs");
        Ok(self.manager.recover_pending_jobs(pending).await)
    }

    pub async fn handle_worker_event(&self, event: WorkerEvent) {
        match event {
            WorkerEvent::JobStarted { worker_id, job } => {
                if !self.manager.register_active_job(job.clone(), worker_id) {
                    return;
                }
                log_job_operation("start", job.id, job.lane, Some(worker_id), "active", None);
                self.persist(JobStateUpdate::for_job(&job, JobStatus::Active, Some(worker_id)))
                    .await;
                self.notifier
                    .notify_user(&job.user_id, UserNotification::JobStarted { job_id: job.id })
                    .await;
            }
            WorkerEvent::JobProgress {
                job_id,
                user_id,
                percent,
                ..
            } => {
                if self.manager.update_job_progress(job_id, percent) {
                    self.notifier
                        .notify_user(&user_id, UserNotification::JobProgress { job_id, percent })
                        .await;
                }
            }
            WorkerEvent::JobCompleted {
                worker_id,
                lane,
                job_id,
                user_id,
                result,
                duration,
                memory_delta,
            } => {
                let Some(job) = self.manager.mark_job_completed(job_id) else {
                    debug!(job_id = %job_id, worker_id = %worker_id, "COORDINATOR: ignoring completion of untracked job");
                    return;
                };
                self.router.record_outcome(lane, true, Some(duration));
                let details = format!(
                    "duration_ms={} memory_delta={}",
                    duration.as_millis(),
                    memory_delta
                );
                log_job_operation("complete", job_id, lane, Some(worker_id), "completed", Some(&details));
                let update = JobStateUpdate::for_job(&job, JobStatus::Completed, Some(worker_id))
                    .with_result(result.clone());
                self.persist(update).await;
                self.notifier
                    .notify_user(&user_id, UserNotification::JobCompleted { job_id, result })
                    .await;
            }
            WorkerEvent::JobFailed {
                worker_id,
                lane,
                job_id,
                error,
                attempts,
                ..
            } => {
                let outcome = self.manager.handle_job_failure(job_id, Some(worker_id), error);
                if outcome != FailureOutcome::Ignored {
                    self.router.record_outcome(lane, false, None);
                }
                debug!(job_id = %job_id, attempts, ?outcome, "COORDINATOR: job failure handled");
            }
            WorkerEvent::Telemetry(snapshot) => {
                self.manager.record_heartbeat(snapshot.worker_id, snapshot.lane);
            }
            WorkerEvent::WorkerStopped { worker_id, lane } => {
                debug!(worker_id = %worker_id, lane = %lane, "COORDINATOR: worker stopped cleanly");
                self.manager.unregister_worker(worker_id);
            }
        }
    }

    pub async fn handle_recovery_event(&self, event: RecoveryEvent) {
        match event {
            RecoveryEvent::RetryScheduled { job, delay, reason } => {
                debug!(
                    job_id = %job.id,
                    retry_count = job.retry_count,
                    delay_ms = delay.as_millis() as u64,
                    reason = %reason,
                    "COORDINATOR: retry scheduled"
                );
                self.release_delivery(&job).await;
                self.persist(JobStateUpdate::for_job(&job, JobStatus::Queued, None))
                    .await;
            }
            RecoveryEvent::RequeueJob { job, reply } => {
                let update = JobStateUpdate::for_job(&job, JobStatus::Queued, None);
                let result = self.router.resubmit(job).await;
                if result.is_ok() {
                    self.persist(update).await;
                }
                if reply.send(result).is_err() {
                    warn!("COORDINATOR: requeue reply receiver dropped");
                }
            }
            RecoveryEvent::JobPermanentlyFailed {
                job,
                reason,
                elapsed,
            } => {
                let details = format!(
                    "reason={} failures={} elapsed_ms={}",
                    reason,
                    job.failure_history.len(),
                    elapsed.as_millis()
                );
                log_job_operation("permanent_failure", job.id, job.lane, None, "failed", Some(&details));
                self.release_delivery(&job).await;
                let update = JobStateUpdate::for_job(&job, JobStatus::Failed, None)
                    .with_failure_reason(reason);
                self.persist(update).await;
            }
            RecoveryEvent::WorkerFailed {
                worker_id,
                lane,
                affected_jobs,
            } => {
                self.notifier
                    .broadcast(SystemAlert::WorkerFailed {
                        worker_id,
                        lane,
                        affected_jobs,
                    })
                    .await;
            }
            RecoveryEvent::RequestWorkerReplacement { worker_id, lane } => {
                match self.lifecycle.replace_worker(worker_id, lane).await {
                    Ok(replacement) => {
                        self.manager.retire_failed_worker(worker_id);
                        info!(
                            failed_worker_id = %worker_id,
                            replacement = %replacement,
                            lane = %lane,
                            "🔄 COORDINATOR: worker replaced"
                        );
                    }
                    Err(e) => error!(
                        failed_worker_id = %worker_id,
                        lane = %lane,
                        error = %e,
                        "❌ COORDINATOR: worker replacement failed"
                    ),
                }
            }
            RecoveryEvent::NotifyUser {
                user_id,
                notification,
            } => {
                self.notifier.notify_user(&user_id, notification).await;
            }
        }
    }

    /// Dispatch both event streams until stopped or both senders are gone,
    /// then drain what is already buffered
    pub async fn run(
        &self,
        mut worker_events: mpsc::UnboundedReceiver<WorkerEvent>,
        mut recovery_events: mpsc::UnboundedReceiver<RecoveryEvent>,
    ) {
        info!("🧭 COORDINATOR: dispatch loop started");

        loop {
            let shutdown = self.shutdown_notify.notified();
            tokio::pin!(shutdown);
            shutdown.as_mut().enable();
            if !self.running.load(Ordering::Acquire) {
                break;
            }

            tokio::select! {
                _ = &mut shutdown => break,
                Some(event) = recovery_events.recv() => self.handle_recovery_event(event).await,
                Some(event) = worker_events.recv() => self.handle_worker_event(event).await,
                else => break,
            }
        }

        let mut drained = 0usize;
        while let Ok(event) = worker_events.try_recv() {
            self.handle_worker_event(event).await;
            drained += 1;
        }
        while let Ok(event) = recovery_events.try_recv() {
            self.handle_recovery_event(event).await;
            drained += 1;
        }

        self.running.store(false, Ordering::Release);
        info!(drained, "🛑 COORDINATOR: dispatch loop stopped");
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.shutdown_notify.notify_waiters();
    }

    /// A failed delivery is never acked by its slot when the slot was killed
    /// or is stuck, so release it here
    async fn release_delivery(&self, job: &Job) {
        if let Err(e) = self.router.release(job.id, job.lane).await {
            warn!(job_id = %job.id, lane = %job.lane, error = %e, "COORDINATOR: could not release delivery");
        }
    }

    async fn persist(&self, update: JobStateUpdate) {
        let job_id = update.job_id;
        let status = update.status;
        if let Err(e) = self.store.update_job(update).await {
            error!(job_id = %job_id, status = %status, error = %e, "❌ COORDINATOR: persistence update failed");
        }
    }
}
