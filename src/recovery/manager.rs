//! # Failure Recovery Manager
//!
//! Single source of truth for "which worker currently owns which job". Jobs
//! are registered the moment a worker accepts them and removed on completion
//! or failure. Two monitors share one periodic tick:
//!
//! - worker health: a worker silent for three ticks is declared failed and
//!   every job tracked under it goes through failure handling
//! - job timeout: a job older than the job timeout, or without progress for
//!   half of it, is failed as stalled
//!
//! Failure handling increments the job's retry count. Once the count reaches
//! `max_retries` the job is permanently failed (exactly once); otherwise a
//! requeue is scheduled after an exponential backoff. The requeue runs inside
//! the circuit breaker, and an open circuit fails the job permanently instead
//! of delaying it forever.
//!
//! All tracking maps live behind one `parking_lot` mutex that is never held
//! across an await point. Outward effects are [`RecoveryEvent`]s on a channel.

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::backoff::BackoffPolicy;
use super::events::RecoveryEvent;
use crate::config::RecoveryConfig;
use crate::error::{DocflowError, Result};
use crate::models::{Job, JobHandle, JobStatus, Lane};
use crate::resilience::{CircuitBreaker, CircuitBreakerError, CircuitBreakerMetrics, CircuitState};
use crate::services::UserNotification;

/// Failure reason for jobs pulled from a dead worker
pub const REASON_WORKER_FAILED: &str = "worker failed";
/// Failure reason for jobs over the timeout or without progress
pub const REASON_JOB_TIMEOUT: &str = "job timeout";
/// Failure reason when the requeue destination is short-circuited
pub const REASON_CIRCUIT_OPEN: &str = "circuit breaker open";
/// Failure reason for jobs found exhausted during startup recovery
pub const REASON_RETRIES_EXHAUSTED: &str = "max retries exceeded before restart";

#[derive(Debug, Clone)]
struct ActiveJob {
    job: Job,
    worker_id: Uuid,
    started_at: Instant,
    last_update: Instant,
    progress: u8,
}

#[derive(Debug, Clone, Copy)]
struct WorkerHeartbeat {
    lane: Lane,
    last_seen: Instant,
}

#[derive(Debug)]
struct PendingRetry {
    job: Job,
    handle: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct TrackingState {
    active_jobs: HashMap<Uuid, ActiveJob>,
    heartbeats: HashMap<Uuid, WorkerHeartbeat>,
    failed_workers: HashSet<Uuid>,
    pending_retries: HashMap<Uuid, PendingRetry>,
    /// Terminal job ids, kept for the tombstone retention to refuse stale redeliveries
    permanently_failed: HashMap<Uuid, Instant>,
    permanently_failed_total: usize,
    /// Jobs already requeued by a startup recovery pass
    recovered: HashMap<Uuid, Instant>,
}

impl TrackingState {
    fn prune_tombstones(&mut self, now: Instant, retention: Duration) -> usize {
        let before = self.permanently_failed.len() + self.recovered.len();
        self.permanently_failed
            .retain(|_, at| now.duration_since(*at) <= retention);
        self.recovered
            .retain(|_, at| now.duration_since(*at) <= retention);
        before - self.permanently_failed.len() - self.recovered.len()
    }
}

#[derive(Debug, Default)]
struct RecoveryPass {
    running: bool,
    backlog: Vec<Job>,
}

/// What failure handling decided for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    RetryScheduled { retry_count: u32, delay: Duration },
    PermanentlyFailed,
    /// The job was not tracked (late report, or owned by another worker)
    Ignored,
}

/// Result of one `recover_pending_jobs` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Handed back to the router
    pub requeued: usize,
    /// Requeue failed and a retry was scheduled
    pub retrying: usize,
    pub permanently_failed: usize,
    /// Terminal, already tracked, or already recovered
    pub skipped: usize,
    /// Arrived while another pass was running; processed by that pass
    pub deferred: usize,
}

/// Operator view of the recovery state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryStats {
    pub active_jobs: usize,
    pub failed_workers: usize,
    pub monitored_workers: usize,
    pub pending_retries: usize,
    pub permanently_failed: usize,
    pub circuit_state: CircuitState,
    pub circuit_metrics: CircuitBreakerMetrics,
}

#[derive(Debug)]
struct ManagerInner {
    config: RecoveryConfig,
    backoff: BackoffPolicy,
    breaker: Arc<CircuitBreaker>,
    events: mpsc::UnboundedSender<RecoveryEvent>,
    state: Mutex<TrackingState>,
    pass: Mutex<RecoveryPass>,
    running: AtomicBool,
    shutdown_notify: Notify,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

/// Tracks active jobs and drives retry or permanent-failure decisions
#[derive(Debug, Clone)]
pub struct FailureRecoveryManager {
    inner: Arc<ManagerInner>,
}

impl FailureRecoveryManager {
    pub fn new(
        config: RecoveryConfig,
        breaker: Arc<CircuitBreaker>,
        events: mpsc::UnboundedSender<RecoveryEvent>,
    ) -> Self {
        let backoff = BackoffPolicy::from_config(&config);
        Self {
            inner: Arc::new(ManagerInner {
                config,
                backoff,
                breaker,
                events,
                state: Mutex::new(TrackingState::default()),
                pass: Mutex::new(RecoveryPass::default()),
                running: AtomicBool::new(false),
                shutdown_notify: Notify::new(),
                monitor: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.inner.config
    }

    pub fn backoff(&self) -> &BackoffPolicy {
        &self.inner.backoff
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.inner.breaker
    }

    /// Start tracking a job a worker has just accepted
    ///
    /// Returns false for jobs that were already permanently failed (a stale
    /// redelivery); those are never tracked again.
    pub fn register_active_job(&self, job: Job, worker_id: Uuid) -> bool {
        let now = Instant::now();
        let mut state = self.inner.state.lock();

        if state.permanently_failed.contains_key(&job.id) {
            warn!(job_id = %job.id, worker_id = %worker_id, "RECOVERY: refusing to track permanently failed job");
            return false;
        }
        if let Some(existing) = state.active_jobs.get(&job.id) {
            if existing.worker_id != worker_id {
                warn!(
                    job_id = %job.id,
                    previous_worker = %existing.worker_id,
                    worker_id = %worker_id,
                    "RECOVERY: job redelivered, moving ownership"
                );
            }
        }
        // a redelivered job running now supersedes its scheduled retry
        if let Some(pending) = state.pending_retries.remove(&job.id) {
            pending.handle.abort();
        }
        if !state.failed_workers.contains(&worker_id) {
            state
                .heartbeats
                .entry(worker_id)
                .and_modify(|hb| hb.last_seen = now)
                .or_insert(WorkerHeartbeat {
                    lane: job.lane,
                    last_seen: now,
                });
        }

        debug!(job_id = %job.id, worker_id = %worker_id, retry_count = job.retry_count, "RECOVERY: tracking job");
        let mut job = job;
        job.status = JobStatus::Active;
        state.active_jobs.insert(
            job.id,
            ActiveJob {
                job,
                worker_id,
                started_at: now,
                last_update: now,
                progress: 0,
            },
        );
        true
    }

    /// Refresh a job's progress; false if the job is not tracked
    pub fn update_job_progress(&self, job_id: Uuid, percent: u8) -> bool {
        let mut state = self.inner.state.lock();
        match state.active_jobs.get_mut(&job_id) {
            Some(entry) => {
                entry.last_update = Instant::now();
                entry.progress = percent.min(100);
                true
            }
            None => false,
        }
    }

    /// Record a liveness signal; false for workers already declared failed
    pub fn record_heartbeat(&self, worker_id: Uuid, lane: Lane) -> bool {
        let mut state = self.inner.state.lock();
        if state.failed_workers.contains(&worker_id) {
            debug!(worker_id = %worker_id, "RECOVERY: ignoring heartbeat from failed worker");
            return false;
        }
        state.heartbeats.insert(
            worker_id,
            WorkerHeartbeat {
                lane,
                last_seen: Instant::now(),
            },
        );
        true
    }

    /// Forget a failed worker once a replacement has taken its place
    pub fn retire_failed_worker(&self, worker_id: Uuid) -> bool {
        let mut state = self.inner.state.lock();
        state.heartbeats.remove(&worker_id);
        state.failed_workers.remove(&worker_id)
    }

    /// Stop monitoring a worker that shut down cleanly
    pub fn unregister_worker(&self, worker_id: Uuid) {
        let mut state = self.inner.state.lock();
        state.heartbeats.remove(&worker_id);
        state.failed_workers.remove(&worker_id);
    }

    /// Drop tracking for a completed job and cancel any retry scheduled for it
    ///
    /// Idempotent: a second (or late) completion returns None.
    pub fn mark_job_completed(&self, job_id: Uuid) -> Option<Job> {
        let mut state = self.inner.state.lock();
        if let Some(entry) = state.active_jobs.remove(&job_id) {
            return Some(entry.job);
        }
        state.pending_retries.remove(&job_id).map(|pending| {
            pending.handle.abort();
            pending.job
        })
    }

    /// Route a tracked job through failure handling
    ///
    /// With `worker_id` set, the failure is only accepted from the worker that
    /// currently owns the job.
    pub fn handle_job_failure(
        &self,
        job_id: Uuid,
        worker_id: Option<Uuid>,
        reason: impl Into<String>,
    ) -> FailureOutcome {
        let reason = reason.into();
        let entry = {
            let mut state = self.inner.state.lock();
            let owned = state
                .active_jobs
                .get(&job_id)
                .is_some_and(|entry| worker_id.map_or(true, |w| w == entry.worker_id));
            if owned {
                state.active_jobs.remove(&job_id)
            } else {
                None
            }
        };

        let Some(entry) = entry else {
            debug!(job_id = %job_id, reason = %reason, "RECOVERY: ignoring failure of untracked job");
            return FailureOutcome::Ignored;
        };

        let mut job = entry.job;
        job.record_failure(Some(entry.worker_id), reason.clone());
        self.decide(job, reason)
    }

    fn decide(&self, job: Job, reason: String) -> FailureOutcome {
        if job.retry_count >= self.inner.config.max_retries {
            self.permanently_fail(job, reason);
            FailureOutcome::PermanentlyFailed
        } else {
            let retry_count = job.retry_count;
            let delay = self.schedule_retry(job, reason);
            FailureOutcome::RetryScheduled { retry_count, delay }
        }
    }

    /// Terminal failure; emits at most once per job
    fn permanently_fail(&self, mut job: Job, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        {
            let mut state = self.inner.state.lock();
            if state.permanently_failed.contains_key(&job.id) {
                return false;
            }
            state.permanently_failed.insert(job.id, Instant::now());
            state.permanently_failed_total += 1;
            state.active_jobs.remove(&job.id);
            if let Some(pending) = state.pending_retries.remove(&job.id) {
                pending.handle.abort();
            }
        }

        job.status = JobStatus::Failed;
        job.last_failure = Some(reason.clone());
        let elapsed = (Utc::now() - job.submitted_at).to_std().unwrap_or_default();

        error!(
            job_id = %job.id,
            user_id = %job.user_id,
            retry_count = job.retry_count,
            failures = job.failure_history.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            reason = %reason,
            "💥 RECOVERY: job permanently failed"
        );

        let notification = UserNotification::JobFailed {
            job_id: job.id,
            reason: reason.clone(),
            will_retry: false,
        };
        let user_id = job.user_id.clone();
        self.emit(RecoveryEvent::JobPermanentlyFailed {
            job,
            reason,
            elapsed,
        });
        self.emit(RecoveryEvent::NotifyUser {
            user_id,
            notification,
        });
        true
    }

    /// Schedule a delayed requeue, returning the delay
    fn schedule_retry(&self, mut job: Job, reason: String) -> Duration {
        let delay = self.inner.backoff.delay(job.retry_count);
        job.status = JobStatus::Queued;

        warn!(
            job_id = %job.id,
            retry_count = job.retry_count,
            max_retries = self.inner.config.max_retries,
            delay_ms = delay.as_millis() as u64,
            reason = %reason,
            "🔁 RECOVERY: scheduling retry"
        );

        self.emit(RecoveryEvent::RetryScheduled {
            job: job.clone(),
            delay,
            reason: reason.clone(),
        });
        self.emit(RecoveryEvent::NotifyUser {
            user_id: job.user_id.clone(),
            notification: UserNotification::JobFailed {
                job_id: job.id,
                reason,
                will_retry: true,
            },
        });

        let this = self.clone();
        let retry_job = job.clone();
        // spawned under the lock so the task cannot look for its entry first
        let mut state = self.inner.state.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.execute_requeue(retry_job).await;
        });
        state
            .pending_retries
            .insert(job.id, PendingRetry { job, handle });
        delay
    }

    fn execute_requeue(&self, job: Job) -> BoxFuture<'static, ()> {
        let this = self.clone();
        async move {
            let still_pending = this.inner.state.lock().pending_retries.remove(&job.id).is_some();
            if !still_pending {
                debug!(job_id = %job.id, "RECOVERY: retry cancelled before requeue");
                return;
            }

            match this.requeue(job.clone()).await {
                Ok(handle) => {
                    info!(
                        job_id = %handle.job_id,
                        lane = %handle.lane,
                        priority = handle.priority,
                        retry_count = job.retry_count,
                        "✅ RECOVERY: job requeued"
                    );
                }
                Err(err) => {
                    this.handle_requeue_failure(job, err);
                }
            }
        }
        .boxed()
    }

    /// Ask the coordinator to resubmit, guarded by the circuit breaker
    async fn requeue(&self, job: Job) -> std::result::Result<JobHandle, CircuitBreakerError<DocflowError>> {
        let events = self.inner.events.clone();
        self.inner
            .breaker
            .call(|| async move {
                let (reply, response) = oneshot::channel();
                events
                    .send(RecoveryEvent::RequeueJob { job, reply })
                    .map_err(|_| DocflowError::ChannelClosed("recovery event receiver dropped".to_string()))?;
                response
                    .await
                    .map_err(|_| DocflowError::ChannelClosed("requeue reply dropped".to_string()))?
            })
            .await
    }

    fn handle_requeue_failure(
        &self,
        mut job: Job,
        err: CircuitBreakerError<DocflowError>,
    ) -> FailureOutcome {
        match err {
            CircuitBreakerError::CircuitOpen { .. } => {
                self.permanently_fail(job, REASON_CIRCUIT_OPEN);
                FailureOutcome::PermanentlyFailed
            }
            CircuitBreakerError::OperationFailed(e) => {
                let reason = format!("requeue failed: {e}");
                job.record_failure(None, reason.clone());
                self.decide(job, reason)
            }
        }
    }

    /// Declare silent workers failed and re-route their jobs
    ///
    /// Returns the ids of the workers declared failed by this check.
    pub fn check_worker_health(&self) -> Vec<Uuid> {
        let timeout = self.inner.config.heartbeat_timeout();
        let now = Instant::now();

        let failed: Vec<(Uuid, Lane, Vec<Uuid>)> = {
            let mut state = self.inner.state.lock();
            let dead: Vec<(Uuid, Lane)> = state
                .heartbeats
                .iter()
                .filter(|(_, hb)| now.duration_since(hb.last_seen) > timeout)
                .map(|(id, hb)| (*id, hb.lane))
                .collect();
            dead.into_iter()
                .map(|(worker_id, lane)| {
                    state.heartbeats.remove(&worker_id);
                    state.failed_workers.insert(worker_id);
                    let jobs = state
                        .active_jobs
                        .values()
                        .filter(|entry| entry.worker_id == worker_id)
                        .map(|entry| entry.job.id)
                        .collect();
                    (worker_id, lane, jobs)
                })
                .collect()
        };

        for (worker_id, lane, jobs) in &failed {
            error!(
                worker_id = %worker_id,
                lane = %lane,
                affected_jobs = jobs.len(),
                timeout_ms = timeout.as_millis() as u64,
                "💀 RECOVERY: worker missed heartbeats, declaring failed"
            );
            self.emit(RecoveryEvent::WorkerFailed {
                worker_id: *worker_id,
                lane: *lane,
                affected_jobs: jobs.clone(),
            });
            for job_id in jobs {
                self.handle_job_failure(*job_id, Some(*worker_id), REASON_WORKER_FAILED);
            }
            self.emit(RecoveryEvent::RequestWorkerReplacement {
                worker_id: *worker_id,
                lane: *lane,
            });
        }

        failed.into_iter().map(|(worker_id, _, _)| worker_id).collect()
    }

    /// Fail jobs past the job timeout or without progress for half of it
    ///
    /// Returns the ids of the jobs failed by this check.
    pub fn check_job_timeouts(&self) -> Vec<Uuid> {
        let job_timeout = self.inner.config.job_timeout();
        let stall_timeout = self.inner.config.stall_timeout();
        let now = Instant::now();

        let stalled: Vec<(Uuid, Uuid)> = {
            let state = self.inner.state.lock();
            state
                .active_jobs
                .values()
                .filter(|entry| {
                    now.duration_since(entry.started_at) > job_timeout
                        || now.duration_since(entry.last_update) > stall_timeout
                })
                .map(|entry| (entry.job.id, entry.worker_id))
                .collect()
        };

        for (job_id, worker_id) in &stalled {
            warn!(job_id = %job_id, worker_id = %worker_id, "⏱️ RECOVERY: job timed out");
            self.handle_job_failure(*job_id, Some(*worker_id), REASON_JOB_TIMEOUT);
        }

        stalled.into_iter().map(|(job_id, _)| job_id).collect()
    }

    /// Start the periodic health and timeout monitor
    #[instrument(skip(self), fields(interval_ms = self.inner.config.health_check_interval_ms))]
    pub fn start_monitoring(&self) -> Result<()> {
        if self.inner.running.swap(true, Ordering::AcqRel) {
            return Err(DocflowError::InvalidState(
                "Recovery monitor is already running".to_string(),
            ));
        }

        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.config.health_check_interval();
        let handle = tokio::spawn(monitor_loop(weak, period));
        *self.inner.monitor.lock() = Some(handle);
        info!("🩺 RECOVERY: monitoring started");
        Ok(())
    }

    /// Stop the monitor, waiting up to `timeout` for the current tick
    pub async fn stop_monitoring(&self, timeout: Duration) -> Result<()> {
        self.inner.running.store(false, Ordering::Release);
        self.inner.shutdown_notify.notify_waiters();

        let handle = self.inner.monitor.lock().take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(timeout, &mut handle).await.is_err() {
                handle.abort();
                return Err(DocflowError::Timeout(
                    "Recovery monitor stop timeout".to_string(),
                ));
            }
        }
        info!("RECOVERY: monitoring stopped");
        Ok(())
    }

    pub fn is_monitoring(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Abort every scheduled retry; their jobs stay queued in persistence
    pub fn cancel_pending_retries(&self) -> usize {
        let mut state = self.inner.state.lock();
        let cancelled = state.pending_retries.len();
        for (_, pending) in state.pending_retries.drain() {
            pending.handle.abort();
        }
        cancelled
    }

    /// Requeue jobs persisted as incomplete before a restart
    ///
    /// Idempotent: jobs already tracked, pending, failed or recovered are
    /// skipped. Re-entrant: a call made while a pass is running appends its
    /// jobs to that pass and returns them as deferred.
    #[instrument(skip(self, jobs), fields(jobs = jobs.len()))]
    pub async fn recover_pending_jobs(&self, jobs: Vec<Job>) -> RecoveryReport {
        let mut report = RecoveryReport::default();
        {
            let mut pass = self.inner.pass.lock();
            if pass.running {
                report.deferred = jobs.len();
                pass.backlog.extend(jobs);
                info!(deferred = report.deferred, "RECOVERY: pass in progress, deferring jobs");
                return report;
            }
            pass.running = true;
        }

        let mut batch = jobs;
        loop {
            for job in batch {
                self.recover_one(job, &mut report).await;
            }
            let mut pass = self.inner.pass.lock();
            if pass.backlog.is_empty() {
                pass.running = false;
                break;
            }
            batch = std::mem::take(&mut pass.backlog);
        }

        info!(
            requeued = report.requeued,
            retrying = report.retrying,
            permanently_failed = report.permanently_failed,
            skipped = report.skipped,
            "🔄 RECOVERY: startup recovery pass complete"
        );
        report
    }

    async fn recover_one(&self, job: Job, report: &mut RecoveryReport) {
        if job.status.is_terminal() {
            report.skipped += 1;
            return;
        }

        let known = {
            let mut state = self.inner.state.lock();
            state.active_jobs.contains_key(&job.id)
                || state.pending_retries.contains_key(&job.id)
                || state.permanently_failed.contains_key(&job.id)
                || state.recovered.insert(job.id, Instant::now()).is_some()
        };
        if known {
            debug!(job_id = %job.id, "RECOVERY: job already known, skipping");
            report.skipped += 1;
            return;
        }

        if job.retry_count >= self.inner.config.max_retries {
            self.permanently_fail(job, REASON_RETRIES_EXHAUSTED);
            report.permanently_failed += 1;
            return;
        }

        match self.requeue(job.clone()).await {
            Ok(_) => report.requeued += 1,
            Err(err) => match self.handle_requeue_failure(job, err) {
                FailureOutcome::PermanentlyFailed => report.permanently_failed += 1,
                FailureOutcome::RetryScheduled { .. } => report.retrying += 1,
                FailureOutcome::Ignored => report.skipped += 1,
            },
        }
    }

    /// Drop terminal and recovered job ids older than the tombstone retention
    pub fn prune_tombstones(&self) -> usize {
        let retention = self.inner.config.tombstone_retention();
        self.inner.state.lock().prune_tombstones(Instant::now(), retention)
    }

    pub fn is_tracked(&self, job_id: Uuid) -> bool {
        self.inner.state.lock().active_jobs.contains_key(&job_id)
    }

    /// Worker currently owning a job
    pub fn owner_of(&self, job_id: Uuid) -> Option<Uuid> {
        self.inner
            .state
            .lock()
            .active_jobs
            .get(&job_id)
            .map(|entry| entry.worker_id)
    }

    pub fn is_worker_failed(&self, worker_id: Uuid) -> bool {
        self.inner.state.lock().failed_workers.contains(&worker_id)
    }

    pub fn recovery_stats(&self) -> RecoveryStats {
        let circuit_metrics = self.inner.breaker.metrics();
        let state = self.inner.state.lock();
        RecoveryStats {
            active_jobs: state.active_jobs.len(),
            failed_workers: state.failed_workers.len(),
            monitored_workers: state.heartbeats.len(),
            pending_retries: state.pending_retries.len(),
            permanently_failed: state.permanently_failed_total,
            circuit_state: circuit_metrics.current_state,
            circuit_metrics,
        }
    }

    fn emit(&self, event: RecoveryEvent) {
        let name = event.name();
        if self.inner.events.send(event).is_err() {
            warn!(event = name, "RECOVERY: event receiver dropped");
        }
    }
}

/// Periodic tick running both monitors until stopped or the manager is dropped
async fn monitor_loop(weak: Weak<ManagerInner>, period: Duration) {
    let mut tick = interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tick.tick().await;

    loop {
        let Some(inner) = weak.upgrade() else {
            debug!("RECOVERY: manager dropped, monitor exiting");
            break;
        };
        let manager = FailureRecoveryManager { inner };

        {
            let shutdown = manager.inner.shutdown_notify.notified();
            tokio::pin!(shutdown);
            shutdown.as_mut().enable();
            if !manager.is_monitoring() {
                break;
            }
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tick.tick() => {}
            }
        }

        let failed_workers = manager.check_worker_health();
        let timed_out = manager.check_job_timeouts();
        let pruned = manager.prune_tombstones();
        if pruned > 0 {
            debug!(pruned, "RECOVERY: expired job tombstones");
        }
        if !failed_workers.is_empty() || !timed_out.is_empty() {
            info!(
                failed_workers = failed_workers.len(),
                timed_out_jobs = timed_out.len(),
                "RECOVERY: monitor tick handled failures"
            );
        }
    }
}
