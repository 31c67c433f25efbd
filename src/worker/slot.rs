//! # Execution Slot
//!
//! One long-lived loop bound to a lane. While idle it polls the durable queue;
//! while a job runs it keeps publishing extrapolated progress and telemetry so
//! a slow job never looks like a dead worker.
//!
//! Shutdown follows the running-flag plus `Notify` pattern: a stop request
//! ends the loop at the next idle point, and the in-flight job (if any) is
//! allowed to finish. A slot that is aborted instead emits nothing, leaving
//! its job to the heartbeat monitor.

use futures::FutureExt;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::telemetry::{ResourceSampler, TelemetryRegistry};
use super::{
    extrapolate_progress, JobProcessor, ProcessingError, WorkerEvent, WorkerSnapshot,
    WorkerStatus,
};
use crate::config::WorkerConfig;
use crate::models::{Job, Lane};
use crate::queue::DurableQueue;

/// A slot running this many times past its expected processing time reports as stalled
const STALL_FACTOR: u32 = 3;

/// Control state shared between a slot and its handle
#[derive(Debug)]
struct SlotState {
    running: AtomicBool,
    shutdown_notify: Notify,
}

impl SlotState {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Everything a slot needs from the pool
#[derive(Clone)]
pub struct SlotContext {
    pub queue: Arc<dyn DurableQueue>,
    pub processor: Arc<dyn JobProcessor>,
    pub events: mpsc::UnboundedSender<WorkerEvent>,
    pub telemetry: Arc<TelemetryRegistry>,
    pub sampler: Arc<ResourceSampler>,
    pub config: WorkerConfig,
}

/// Handle kept by the pool for a spawned slot
#[derive(Debug)]
pub struct SlotHandle {
    worker_id: Uuid,
    lane: Lane,
    state: Arc<SlotState>,
    join: JoinHandle<()>,
}

impl SlotHandle {
    pub fn worker_id(&self) -> Uuid {
        self.worker_id
    }

    pub fn lane(&self) -> Lane {
        self.lane
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stop accepting new jobs; the loop exits at its next idle point
    pub fn request_stop(&self) {
        self.state.running.store(false, Ordering::Release);
        self.state.shutdown_notify.notify_waiters();
    }

    /// Stop gracefully, force-closing after `grace`. Returns false if forced.
    pub async fn stop(self, grace: Duration) -> bool {
        self.request_stop();
        let mut join = self.join;
        match tokio::time::timeout(grace, &mut join).await {
            Ok(Ok(())) => true,
            Ok(Err(join_error)) => {
                error!(worker_id = %self.worker_id, error = %join_error, "WORKER: slot task ended abnormally");
                true
            }
            Err(_) => {
                warn!(
                    worker_id = %self.worker_id,
                    grace_ms = grace.as_millis() as u64,
                    "⏱️ WORKER: grace period elapsed, force-closing slot"
                );
                join.abort();
                false
            }
        }
    }

    /// Kill the slot without letting it finish or report
    pub fn abort(&self) {
        self.join.abort();
    }
}

/// The processing loop of a single worker
pub struct WorkerSlot {
    id: Uuid,
    lane: Lane,
    ctx: SlotContext,
    state: Arc<SlotState>,
    status: WorkerStatus,
    current_job: Option<Uuid>,
    jobs_processed: u64,
    jobs_failed: u64,
    recent_durations: VecDeque<Duration>,
    last_error: Option<String>,
}

impl WorkerSlot {
    pub fn new(lane: Lane, ctx: SlotContext) -> Self {
        Self {
            id: Uuid::new_v4(),
            lane,
            ctx,
            state: Arc::new(SlotState {
                running: AtomicBool::new(false),
                shutdown_notify: Notify::new(),
            }),
            status: WorkerStatus::Idle,
            current_job: None,
            jobs_processed: 0,
            jobs_failed: 0,
            recent_durations: VecDeque::new(),
            last_error: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Start the loop on the runtime
    pub fn spawn(self) -> SlotHandle {
        self.state.running.store(true, Ordering::Release);
        let worker_id = self.id;
        let lane = self.lane;
        let state = Arc::clone(&self.state);
        let join = tokio::spawn(self.run());
        SlotHandle {
            worker_id,
            lane,
            state,
            join,
        }
    }

    #[instrument(skip(self), fields(worker_id = %self.id, lane = %self.lane))]
    async fn run(mut self) {
        info!("⚙️ WORKER: slot started");

        let mut telemetry_tick = interval(self.ctx.config.telemetry_interval());
        telemetry_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        telemetry_tick.tick().await;
        self.publish_telemetry();

        let state = Arc::clone(&self.state);
        loop {
            let shutdown = state.shutdown_notify.notified();
            tokio::pin!(shutdown);
            shutdown.as_mut().enable();
            if !state.is_running() {
                break;
            }

            match self.ctx.queue.dequeue(self.lane).await {
                Ok(Some(job)) => {
                    self.process_job(job, &mut telemetry_tick).await;
                    continue;
                }
                Ok(None) => {
                    if self.status == WorkerStatus::Error {
                        self.status = WorkerStatus::Idle;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "WORKER: dequeue failed");
                    self.status = WorkerStatus::Error;
                    self.last_error = Some(e.to_string());
                }
            }

            tokio::select! {
                _ = &mut shutdown => break,
                _ = telemetry_tick.tick() => self.publish_telemetry(),
                _ = tokio::time::sleep(self.ctx.config.poll_interval()) => {}
            }
        }

        self.status = WorkerStatus::ShuttingDown;
        self.ctx.telemetry.remove(self.id);
        self.emit(WorkerEvent::WorkerStopped {
            worker_id: self.id,
            lane: self.lane,
        });
        info!(
            jobs_processed = self.jobs_processed,
            jobs_failed = self.jobs_failed,
            "🛑 WORKER: slot stopped"
        );
    }

    async fn process_job(&mut self, job: Job, telemetry_tick: &mut Interval) {
        let started = Instant::now();
        let memory_before = self.ctx.sampler.sample().memory_bytes;
        let expected = self.expected_processing_time();

        self.status = WorkerStatus::Processing;
        self.current_job = Some(job.id);
        debug!(job_id = %job.id, expected_ms = expected.as_millis() as u64, "WORKER: job started");
        self.emit(WorkerEvent::JobStarted {
            worker_id: self.id,
            job: job.clone(),
        });

        let processor = Arc::clone(&self.ctx.processor);
        let processing = AssertUnwindSafe(processor.process(&job)).catch_unwind();
        tokio::pin!(processing);

        let progress_interval = self.ctx.config.progress_interval();
        let mut progress_tick = interval_at(started + progress_interval, progress_interval);
        progress_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let outcome = loop {
            tokio::select! {
                outcome = &mut processing => {
                    break outcome.unwrap_or_else(|_| {
                        Err(ProcessingError::Crashed("processor panicked".to_string()))
                    });
                }
                _ = progress_tick.tick() => {
                    let percent = extrapolate_progress(started.elapsed(), expected);
                    self.emit(WorkerEvent::JobProgress {
                        worker_id: self.id,
                        job_id: job.id,
                        user_id: job.user_id.clone(),
                        percent,
                    });
                }
                _ = telemetry_tick.tick() => {
                    if started.elapsed() > expected * STALL_FACTOR {
                        self.status = WorkerStatus::Stalled;
                    }
                    self.publish_telemetry();
                }
            }
        };

        let duration = started.elapsed();
        if let Err(e) = self.ctx.queue.ack(self.lane, job.id).await {
            warn!(job_id = %job.id, error = %e, "WORKER: failed to acknowledge job");
        }
        self.current_job = None;

        match outcome {
            Ok(result) => {
                self.jobs_processed += 1;
                self.record_duration(duration);
                self.status = WorkerStatus::Idle;
                let memory_after = self.ctx.sampler.sample().memory_bytes;
                let memory_delta = memory_after as i64 - memory_before as i64;
                info!(
                    job_id = %job.id,
                    duration_ms = duration.as_millis() as u64,
                    memory_delta,
                    "✅ WORKER: job completed"
                );
                self.emit(WorkerEvent::JobCompleted {
                    worker_id: self.id,
                    lane: self.lane,
                    job_id: job.id,
                    user_id: job.user_id.clone(),
                    result,
                    duration,
                    memory_delta,
                });
            }
            Err(e) => {
                self.jobs_failed += 1;
                self.status = WorkerStatus::Error;
                self.last_error = Some(e.to_string());
                warn!(job_id = %job.id, error = %e, "❌ WORKER: job failed");
                self.emit(WorkerEvent::JobFailed {
                    worker_id: self.id,
                    lane: self.lane,
                    job_id: job.id,
                    user_id: job.user_id.clone(),
                    error: e.to_string(),
                    attempts: job.retry_count + 1,
                });
            }
        }

        self.publish_telemetry();
    }

    fn record_duration(&mut self, duration: Duration) {
        self.recent_durations.push_back(duration);
        while self.recent_durations.len() > self.ctx.config.rolling_window.max(1) {
            self.recent_durations.pop_front();
        }
    }

    fn average_processing_time(&self) -> Option<Duration> {
        if self.recent_durations.is_empty() {
            return None;
        }
        let total: Duration = self.recent_durations.iter().sum();
        Some(total / self.recent_durations.len() as u32)
    }

    fn expected_processing_time(&self) -> Duration {
        self.average_processing_time()
            .unwrap_or_else(|| self.ctx.config.expected_processing_time())
    }

    /// Publish a snapshot to the shared surface and report it as a heartbeat
    fn publish_telemetry(&mut self) {
        let sample = self.ctx.sampler.sample();
        let snapshot = WorkerSnapshot {
            worker_id: self.id,
            lane: self.lane,
            status: self.status,
            current_job: self.current_job,
            memory_bytes: sample.memory_bytes,
            cpu_percent: sample.cpu_percent,
            jobs_processed: self.jobs_processed,
            jobs_failed: self.jobs_failed,
            avg_processing_ms: self
                .average_processing_time()
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            last_heartbeat: chrono::Utc::now(),
            last_error: self.last_error.clone(),
        };
        self.ctx.telemetry.publish(snapshot.clone());
        self.emit(WorkerEvent::Telemetry(snapshot));
    }

    fn emit(&self, event: WorkerEvent) {
        if self.ctx.events.send(event).is_err() {
            debug!(worker_id = %self.id, "WORKER: event receiver dropped");
        }
    }
}
