//! # Priority Queue Router
//!
//! Classifies submissions into lanes, computes dequeue priority and reports
//! per-lane queue statistics and worker recommendations.
//!
//! ## Lane selection
//!
//! - payload larger than the large-file threshold: `large`, regardless of tier
//! - premium tiers (`pro`, `enterprise`, `unlimited`, `ilimitado`): `premium`
//! - everything else: `normal`
//!
//! ## Priority (lower is served first)
//!
//! - `unlimited` / `ilimitado`: 1
//! - `pro` / `enterprise`: 2
//! - everything else: 3

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::System;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use super::DurableQueue;
use crate::config::{LanesConfig, QueueConfig};
use crate::error::{DocflowError, Result};
use crate::models::{Job, JobHandle, JobStatus, JobSubmission, Lane, SubscriptionTier};

/// Window the completed/failed counters cover
const OUTCOME_WINDOW: Duration = Duration::from_secs(3600);
/// Recent processing times kept for the wait estimate
const PROCESSING_SAMPLE_SIZE: usize = 100;

/// Pick the lane for a payload
pub fn select_lane(tier: &SubscriptionTier, size_bytes: u64, large_file_threshold: u64) -> Lane {
    if size_bytes > large_file_threshold {
        Lane::Large
    } else if tier.is_premium() {
        Lane::Premium
    } else {
        Lane::Normal
    }
}

/// Dequeue priority for a tier, lower is served first
pub fn compute_priority(tier: &SubscriptionTier) -> u8 {
    tier.priority()
}

/// Operator-facing statistics for one lane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneStats {
    pub lane: Lane,
    pub waiting: usize,
    pub active: usize,
    pub completed_last_hour: usize,
    pub failed_last_hour: usize,
    /// failed / (completed + failed) over the last hour
    pub error_rate: f64,
    pub avg_processing_ms: u64,
    pub estimated_wait_ms: u64,
}

/// Recommended worker count for one lane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaneRecommendation {
    pub lane: Lane,
    pub workers: usize,
    pub priority_band: (u8, u8),
}

/// Worker recommendation across all lanes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfiguration {
    pub system_load: f64,
    pub lanes: Vec<LaneRecommendation>,
}

impl QueueConfiguration {
    pub fn workers_for(&self, lane: Lane) -> usize {
        self.lanes
            .iter()
            .find(|rec| rec.lane == lane)
            .map(|rec| rec.workers)
            .unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct LaneOutcomes {
    completed: VecDeque<Instant>,
    failed: VecDeque<Instant>,
    processing_times: VecDeque<Duration>,
}

impl LaneOutcomes {
    fn prune(&mut self, now: Instant) {
        for window in [&mut self.completed, &mut self.failed] {
            while window
                .front()
                .is_some_and(|at| now.duration_since(*at) > OUTCOME_WINDOW)
            {
                window.pop_front();
            }
        }
    }

    fn avg_processing(&self) -> Option<Duration> {
        if self.processing_times.is_empty() {
            return None;
        }
        let total: Duration = self.processing_times.iter().sum();
        Some(total / self.processing_times.len() as u32)
    }
}

/// Routes submissions into lanes of the durable queue
pub struct PriorityQueueRouter {
    queue: Arc<dyn DurableQueue>,
    queue_config: QueueConfig,
    lanes_config: LanesConfig,
    /// Fallback for the wait estimate before any job finished
    default_processing_time: Duration,
    outcomes: Mutex<HashMap<Lane, LaneOutcomes>>,
}

impl std::fmt::Debug for PriorityQueueRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityQueueRouter")
            .field("queue_config", &self.queue_config)
            .field("lanes_config", &self.lanes_config)
            .finish()
    }
}

impl PriorityQueueRouter {
    pub fn new(
        queue: Arc<dyn DurableQueue>,
        queue_config: QueueConfig,
        lanes_config: LanesConfig,
        default_processing_time: Duration,
    ) -> Self {
        info!(
            large_file_threshold_bytes = queue_config.large_file_threshold_bytes,
            premium_concurrency = lanes_config.premium.concurrency,
            normal_concurrency = lanes_config.normal.concurrency,
            large_concurrency = lanes_config.large.concurrency,
            "🧭 ROUTER: Priority queue router initialized"
        );
        Self {
            queue,
            queue_config,
            lanes_config,
            default_processing_time,
            outcomes: Mutex::new(HashMap::new()),
        }
    }

    /// Lane and priority a payload of this tier and size would receive
    pub fn classify(&self, tier: &SubscriptionTier, size_bytes: u64) -> (Lane, u8) {
        let lane = select_lane(tier, size_bytes, self.queue_config.large_file_threshold_bytes);
        (lane, compute_priority(tier))
    }

    /// Build the queued job a submission turns into, without enqueueing it
    pub fn prepare(&self, submission: JobSubmission) -> Job {
        let (lane, priority) = self.classify(&submission.tier, submission.size_bytes);
        Job::from_submission(submission, lane, priority)
    }

    /// Accept a new submission into the durable queue
    ///
    /// Fails with [`DocflowError::QueueUnavailable`] when the queue cannot be
    /// reached; the job is never silently dropped.
    #[instrument(skip(self, submission), fields(user_id = %submission.user_id, tier = %submission.tier))]
    pub async fn submit(&self, submission: JobSubmission) -> Result<JobHandle> {
        let job = self.prepare(submission);
        self.submit_prepared(job).await
    }

    /// Enqueue a job built by [`prepare`](Self::prepare)
    pub async fn submit_prepared(&self, job: Job) -> Result<JobHandle> {
        let handle = job.handle();
        self.enqueue(job).await?;

        info!(
            job_id = %handle.job_id,
            lane = %handle.lane,
            priority = handle.priority,
            "📥 ROUTER: Job submitted"
        );
        Ok(handle)
    }

    /// Put an existing job back in the queue, recomputing lane and priority
    /// from its original tier and size
    pub async fn resubmit(&self, mut job: Job) -> Result<JobHandle> {
        let (lane, priority) = self.classify(&job.tier, job.size_bytes);
        job.lane = lane;
        job.priority = priority;
        job.status = JobStatus::Queued;
        let handle = job.handle();
        let retry_count = job.retry_count;

        self.enqueue(job).await?;

        info!(
            job_id = %handle.job_id,
            lane = %lane,
            priority,
            retry_count,
            "🔁 ROUTER: Job resubmitted"
        );
        Ok(handle)
    }

    async fn enqueue(&self, job: Job) -> Result<()> {
        let lane = job.lane;
        let priority = job.priority;
        let job_id = job.id;
        self.queue.enqueue(lane, job, priority).await.map_err(|e| {
            error!(job_id = %job_id, lane = %lane, error = %e, "❌ ROUTER: Enqueue failed");
            DocflowError::from(e)
        })
    }

    /// Remove a job before any worker picked it up
    pub async fn cancel(&self, job_id: Uuid, lane: Lane) -> Result<bool> {
        let removed = self.queue.remove(lane, job_id).await?;
        debug!(job_id = %job_id, lane = %lane, removed, "ROUTER: Cancel requested");
        Ok(removed)
    }

    /// Release a delivery whose consumer is gone (killed or abandoned slot)
    pub async fn release(&self, job_id: Uuid, lane: Lane) -> Result<()> {
        self.queue.ack(lane, job_id).await?;
        debug!(job_id = %job_id, lane = %lane, "ROUTER: Delivery released");
        Ok(())
    }

    /// Feed a finished job into the rolling per-lane counters
    pub fn record_outcome(&self, lane: Lane, success: bool, processing_time: Option<Duration>) {
        let now = Instant::now();
        let mut outcomes = self.outcomes.lock();
        let entry = outcomes.entry(lane).or_default();
        if success {
            entry.completed.push_back(now);
        } else {
            entry.failed.push_back(now);
        }
        if let Some(elapsed) = processing_time {
            entry.processing_times.push_back(elapsed);
            if entry.processing_times.len() > PROCESSING_SAMPLE_SIZE {
                entry.processing_times.pop_front();
            }
        }
        entry.prune(now);
    }

    /// Statistics for every lane
    pub async fn stats(&self) -> Result<Vec<LaneStats>> {
        let mut all = Vec::with_capacity(Lane::ALL.len());
        for lane in Lane::ALL {
            all.push(self.lane_stats(lane).await?);
        }
        Ok(all)
    }

    pub async fn lane_stats(&self, lane: Lane) -> Result<LaneStats> {
        let raw = self.queue.stats(lane).await?;
        let concurrency = self.lanes_config.concurrency(lane).max(1);

        let (completed, failed, avg_processing) = {
            let mut outcomes = self.outcomes.lock();
            let entry = outcomes.entry(lane).or_default();
            entry.prune(Instant::now());
            (
                entry.completed.len(),
                entry.failed.len(),
                entry.avg_processing().unwrap_or(self.default_processing_time),
            )
        };

        let finished = completed + failed;
        let error_rate = if finished > 0 {
            failed as f64 / finished as f64
        } else {
            0.0
        };
        let estimated_wait = avg_processing * raw.waiting as u32 / concurrency as u32;

        Ok(LaneStats {
            lane,
            waiting: raw.waiting,
            active: raw.active,
            completed_last_hour: completed,
            failed_last_hour: failed,
            error_rate,
            avg_processing_ms: avg_processing.as_millis() as u64,
            estimated_wait_ms: estimated_wait.as_millis() as u64,
        })
    }

    /// Recommended worker counts per lane at the given normalised system load
    ///
    /// The premium lane always keeps at least one dedicated worker, and at
    /// least two while load is below the configured threshold.
    pub fn queue_configuration(&self, system_load: f64) -> QueueConfiguration {
        let lanes = Lane::ALL
            .iter()
            .map(|&lane| {
                let configured = self.lanes_config.concurrency(lane);
                let workers = match lane {
                    Lane::Premium if system_load < self.queue_config.premium_load_threshold => {
                        configured.max(2)
                    }
                    Lane::Premium => configured.max(1),
                    _ => configured,
                };
                LaneRecommendation {
                    lane,
                    workers,
                    priority_band: lane.priority_band(),
                }
            })
            .collect();

        QueueConfiguration { system_load, lanes }
    }

    pub fn large_file_threshold(&self) -> u64 {
        self.queue_config.large_file_threshold_bytes
    }
}

/// One-minute load average normalised by the number of CPUs
pub fn sample_system_load() -> f64 {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1) as f64;
    System::load_average().one / cpus
}
