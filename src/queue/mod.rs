//! # Queue Module
//!
//! Lane classification and the durable queue seam.
//!
//! The durable queue is an external collaborator assumed to provide
//! at-least-once delivery and priority-then-FIFO ordering within a lane. The
//! core never persists queued-but-unassigned jobs itself.
//!
//! - [`DurableQueue`] - trait every queue backend implements
//! - [`InMemoryQueue`] - heap-backed implementation for development and tests
//! - [`PriorityQueueRouter`] - lane selection, priority and queue statistics

pub mod memory;
pub mod router;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Job, Lane};

pub use memory::InMemoryQueue;
pub use router::{
    compute_priority, sample_system_load, select_lane, LaneRecommendation, LaneStats,
    PriorityQueueRouter, QueueConfiguration,
};

/// Errors surfaced by a durable queue backend
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    /// Backend could not be reached at all
    #[error("Queue unavailable: {message}")]
    Unavailable { message: String },

    /// Backend reached but the operation failed
    #[error("Queue operation failed: {operation}: {message}")]
    Operation { operation: String, message: String },
}

/// Raw counters reported by the queue backend for one lane
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaneQueueStats {
    /// Enqueued and not yet handed to a worker
    pub waiting: usize,
    /// Handed to a worker and not yet acknowledged
    pub active: usize,
}

/// Durable queue consumed by the router (enqueue) and worker slots (dequeue)
#[async_trait]
pub trait DurableQueue: Send + Sync {
    /// Add a job to a lane; lower priority values are dequeued first
    async fn enqueue(&self, lane: Lane, job: Job, priority: u8) -> Result<(), QueueError>;

    /// Take the next job of a lane, if any
    async fn dequeue(&self, lane: Lane) -> Result<Option<Job>, QueueError>;

    /// Acknowledge that a dequeued job is finished (completed or failed)
    async fn ack(&self, lane: Lane, job_id: Uuid) -> Result<(), QueueError>;

    /// Remove a job that has not been picked up yet; false if it was not waiting
    async fn remove(&self, lane: Lane, job_id: Uuid) -> Result<bool, QueueError>;

    async fn stats(&self, lane: Lane) -> Result<LaneQueueStats, QueueError>;
}
