//! # Worker Pool Management
//!
//! Owns the execution slots of every lane: starts the configured concurrency
//! per lane, spawns and stops individual slots, replaces failed workers and
//! shuts everything down within a bounded grace period.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::slot::{SlotContext, SlotHandle, WorkerSlot};
use super::telemetry::{ResourceSampler, TelemetryRegistry};
use super::{JobProcessor, WorkerEvent};
use crate::config::{LanesConfig, WorkerConfig};
use crate::error::{DocflowError, Result};
use crate::models::Lane;
use crate::queue::DurableQueue;
use crate::services::WorkerLifecycle;

/// Outcome of a pool-wide shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownSummary {
    /// Slots that finished their in-flight job and exited
    pub graceful: usize,
    /// Slots force-closed after the grace period
    pub forced: usize,
}

/// Pool of execution slots across all lanes
pub struct WorkerPool {
    ctx: SlotContext,
    lanes: LanesConfig,
    slots: Mutex<HashMap<Uuid, SlotHandle>>,
    accepting: AtomicBool,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("lanes", &self.lanes)
            .field("workers", &self.slots.lock().len())
            .field("accepting", &self.accepting.load(Ordering::Acquire))
            .finish()
    }
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn DurableQueue>,
        processor: Arc<dyn JobProcessor>,
        events: mpsc::UnboundedSender<WorkerEvent>,
        worker_config: WorkerConfig,
        lanes: LanesConfig,
    ) -> Self {
        Self {
            ctx: SlotContext {
                queue,
                processor,
                events,
                telemetry: Arc::new(TelemetryRegistry::new()),
                sampler: Arc::new(ResourceSampler::new()),
                config: worker_config,
            },
            lanes,
            slots: Mutex::new(HashMap::new()),
            accepting: AtomicBool::new(true),
        }
    }

    /// Shared telemetry surface all slots publish to
    pub fn telemetry(&self) -> Arc<TelemetryRegistry> {
        Arc::clone(&self.ctx.telemetry)
    }

    /// Spawn the configured concurrency of every lane
    #[instrument(skip(self))]
    pub fn start(&self) -> Result<Vec<Uuid>> {
        let mut started = Vec::new();
        for lane in Lane::ALL {
            for _ in 0..self.lanes.concurrency(lane) {
                started.push(self.spawn_worker(lane)?);
            }
        }
        info!(workers = started.len(), "🏊 WORKER: pool started");
        Ok(started)
    }

    /// Add one slot to a lane
    pub fn spawn_worker(&self, lane: Lane) -> Result<Uuid> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(DocflowError::WorkerLifecycle(format!(
                "pool is shutting down, refusing to spawn a {lane} worker"
            )));
        }
        let slot = WorkerSlot::new(lane, self.ctx.clone());
        let worker_id = slot.id();
        let handle = slot.spawn();
        self.slots.lock().insert(worker_id, handle);
        info!(worker_id = %worker_id, lane = %lane, "🚀 WORKER: spawned");
        Ok(worker_id)
    }

    /// Gracefully stop one slot. Returns false if it had to be force-closed.
    pub async fn stop_worker(&self, worker_id: Uuid, grace: Duration) -> Result<bool> {
        let handle = self.slots.lock().remove(&worker_id).ok_or_else(|| {
            DocflowError::WorkerLifecycle(format!("unknown worker {worker_id}"))
        })?;
        let graceful = handle.stop(grace).await;
        if !graceful {
            self.ctx.telemetry.remove(worker_id);
        }
        Ok(graceful)
    }

    /// Abort a slot on the spot, as a crash would. Its in-flight job is left
    /// for the heartbeat monitor.
    pub fn kill_worker(&self, worker_id: Uuid) -> bool {
        match self.slots.lock().remove(&worker_id) {
            Some(handle) => {
                warn!(worker_id = %worker_id, "💀 WORKER: killed");
                handle.abort();
                self.ctx.telemetry.remove(worker_id);
                true
            }
            None => false,
        }
    }

    pub fn worker_ids(&self, lane: Lane) -> Vec<Uuid> {
        self.slots
            .lock()
            .values()
            .filter(|handle| handle.lane() == lane)
            .map(SlotHandle::worker_id)
            .collect()
    }

    pub fn worker_count(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn lane_of(&self, worker_id: Uuid) -> Option<Lane> {
        self.slots.lock().get(&worker_id).map(SlotHandle::lane)
    }

    /// Stop every slot, waiting up to `grace` for in-flight jobs
    #[instrument(skip(self), fields(grace_ms = grace.as_millis() as u64))]
    pub async fn shutdown(&self, grace: Duration) -> ShutdownSummary {
        self.accepting.store(false, Ordering::Release);
        let handles: Vec<SlotHandle> = self.slots.lock().drain().map(|(_, h)| h).collect();
        info!(workers = handles.len(), "🛑 WORKER: pool shutting down");

        // stop accepting everywhere before waiting on any single slot
        for handle in &handles {
            handle.request_stop();
        }

        let ids: Vec<Uuid> = handles.iter().map(SlotHandle::worker_id).collect();
        let outcomes = futures::future::join_all(handles.into_iter().map(|h| h.stop(grace))).await;

        let mut summary = ShutdownSummary::default();
        for (worker_id, graceful) in ids.into_iter().zip(outcomes) {
            if graceful {
                summary.graceful += 1;
            } else {
                summary.forced += 1;
                self.ctx.telemetry.remove(worker_id);
            }
        }
        info!(
            graceful = summary.graceful,
            forced = summary.forced,
            "✅ WORKER: pool shut down"
        );
        summary
    }
}

#[async_trait]
impl WorkerLifecycle for WorkerPool {
    async fn replace_worker(&self, failed_worker_id: Uuid, lane: Lane) -> Result<Uuid> {
        // a declared-failed slot may still be alive but unresponsive
        if self.kill_worker(failed_worker_id) {
            info!(worker_id = %failed_worker_id, "WORKER: reaped failed worker before replacement");
        }
        let replacement = self.spawn_worker(lane)?;
        info!(
            failed_worker_id = %failed_worker_id,
            replacement = %replacement,
            lane = %lane,
            "🔄 WORKER: replaced failed worker"
        );
        Ok(replacement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LaneConfig;
    use crate::models::Job;
    use crate::queue::InMemoryQueue;
    use crate::worker::ProcessingError;

    struct InstantProcessor;

    #[async_trait]
    impl JobProcessor for InstantProcessor {
        async fn process(&self, _job: &Job) -> std::result::Result<serde_json::Value, ProcessingError> {
            Ok(serde_json::json!({ "ok": true }))
        }
    }

    fn pool() -> (WorkerPool, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let lanes = LanesConfig {
            premium: LaneConfig { concurrency: 2 },
            normal: LaneConfig { concurrency: 1 },
            large: LaneConfig { concurrency: 1 },
        };
        let pool = WorkerPool::new(
            Arc::new(InMemoryQueue::new()),
            Arc::new(InstantProcessor),
            tx,
            WorkerConfig::default(),
            lanes,
        );
        (pool, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_spawns_configured_concurrency() {
        let (pool, _rx) = pool();
        let started = pool.start().unwrap();
        assert_eq!(started.len(), 4);
        assert_eq!(pool.worker_ids(Lane::Premium).len(), 2);
        assert_eq!(pool.worker_ids(Lane::Large).len(), 1);

        let summary = pool.shutdown(Duration::from_secs(1)).await;
        assert_eq!(summary, ShutdownSummary { graceful: 4, forced: 0 });
        assert_eq!(pool.worker_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_worker_keeps_lane() {
        let (pool, _rx) = pool();
        let failed = pool.spawn_worker(Lane::Large).unwrap();

        let replacement = pool.replace_worker(failed, Lane::Large).await.unwrap();
        assert_ne!(replacement, failed);
        assert_eq!(pool.lane_of(replacement), Some(Lane::Large));
        assert_eq!(pool.lane_of(failed), None);

        pool.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_spawning_after_shutdown() {
        let (pool, _rx) = pool();
        pool.shutdown(Duration::from_secs(1)).await;
        let err = pool.spawn_worker(Lane::Normal).unwrap_err();
        assert!(matches!(err, DocflowError::WorkerLifecycle(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_unknown_worker_is_an_error() {
        let (pool, _rx) = pool();
        assert!(pool.stop_worker(Uuid::new_v4(), Duration::from_secs(1)).await.is_err());
    }
}
