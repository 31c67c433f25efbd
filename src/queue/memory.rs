//! In-memory durable queue
//!
//! Per-lane binary heaps ordered by (priority, enqueue sequence). Delivery is
//! priority-first and FIFO among equal priorities.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;
use uuid::Uuid;

use super::{DurableQueue, LaneQueueStats, QueueError};
use crate::models::{Job, Lane};

#[derive(Debug)]
struct QueuedEntry {
    priority: u8,
    sequence: u64,
    job: Job,
}

impl PartialEq for QueuedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for QueuedEntry {}

impl PartialOrd for QueuedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEntry {
    // BinaryHeap is a max-heap: the "greatest" entry has the lowest priority
    // value and, among equals, the lowest sequence
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Debug, Default)]
struct LaneState {
    waiting: BinaryHeap<QueuedEntry>,
    active: HashSet<Uuid>,
}

/// Heap-backed [`DurableQueue`] for development and tests
#[derive(Debug)]
pub struct InMemoryQueue {
    lanes: Mutex<HashMap<Lane, LaneState>>,
    sequence: AtomicU64,
    available: AtomicBool,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self {
            lanes: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(0),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the backend going away (or coming back)
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    fn ensure_available(&self) -> Result<(), QueueError> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(QueueError::Unavailable {
                message: "in-memory queue marked unavailable".to_string(),
            })
        }
    }

    /// Jobs waiting in a lane, in delivery order
    pub fn waiting_jobs(&self, lane: Lane) -> Vec<Job> {
        let lanes = self.lanes.lock();
        let Some(state) = lanes.get(&lane) else {
            return Vec::new();
        };
        let mut entries: Vec<&QueuedEntry> = state.waiting.iter().collect();
        entries.sort_by(|a, b| b.cmp(a));
        entries.into_iter().map(|e| e.job.clone()).collect()
    }
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableQueue for InMemoryQueue {
    async fn enqueue(&self, lane: Lane, job: Job, priority: u8) -> Result<(), QueueError> {
        self.ensure_available()?;
        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel);
        debug!(job_id = %job.id, lane = %lane, priority, sequence, "Enqueued job");
        self.lanes
            .lock()
            .entry(lane)
            .or_default()
            .waiting
            .push(QueuedEntry {
                priority,
                sequence,
                job,
            });
        Ok(())
    }

    async fn dequeue(&self, lane: Lane) -> Result<Option<Job>, QueueError> {
        self.ensure_available()?;
        let mut lanes = self.lanes.lock();
        let state = lanes.entry(lane).or_default();
        Ok(state.waiting.pop().map(|entry| {
            state.active.insert(entry.job.id);
            entry.job
        }))
    }

    async fn ack(&self, lane: Lane, job_id: Uuid) -> Result<(), QueueError> {
        self.ensure_available()?;
        if let Some(state) = self.lanes.lock().get_mut(&lane) {
            state.active.remove(&job_id);
        }
        Ok(())
    }

    async fn remove(&self, lane: Lane, job_id: Uuid) -> Result<bool, QueueError> {
        self.ensure_available()?;
        let mut lanes = self.lanes.lock();
        let Some(state) = lanes.get_mut(&lane) else {
            return Ok(false);
        };
        let before = state.waiting.len();
        state.waiting.retain(|entry| entry.job.id != job_id);
        Ok(state.waiting.len() < before)
    }

    async fn stats(&self, lane: Lane) -> Result<LaneQueueStats, QueueError> {
        self.ensure_available()?;
        let lanes = self.lanes.lock();
        Ok(lanes
            .get(&lane)
            .map(|state| LaneQueueStats {
                waiting: state.waiting.len(),
                active: state.active.len(),
            })
            .unwrap_or_default())
    }
}
