//! # Worker Pool
//!
//! Long-lived execution slots bound to one lane each. A slot pulls jobs from
//! the durable queue, hands them to the external [`JobProcessor`] and reports
//! what happened as [`WorkerEvent`]s. Slots never retry on their own; retry
//! policy belongs to the recovery manager.
//!
//! ## Components
//!
//! - [`WorkerSlot`] - the per-slot processing loop
//! - [`WorkerPool`] - owns the slots of every lane, spawns, stops and replaces them
//! - [`TelemetryRegistry`] - shared surface holding the latest [`WorkerSnapshot`] per worker

pub mod pool;
pub mod slot;
pub mod telemetry;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Job, Lane};

pub use pool::WorkerPool;
pub use slot::{SlotHandle, WorkerSlot};
pub use telemetry::{ResourceSampler, ResourceSample, TelemetryRegistry};

/// Failure raised by the external processing collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessingError {
    /// The processor ran and reported an error
    #[error("Processing failed: {0}")]
    Failed(String),

    /// The processor died or returned garbage
    #[error("Processor crashed: {0}")]
    Crashed(String),
}

/// External processing collaborator, invoked once per job
///
/// Treated as an opaque, possibly slow, possibly crashing black box.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, job: &Job) -> Result<serde_json::Value, ProcessingError>;
}

/// Lifecycle status of a worker slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Processing,
    Error,
    /// Still processing well past the expected processing time
    Stalled,
    ShuttingDown,
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerStatus::Idle => "idle",
            WorkerStatus::Processing => "processing",
            WorkerStatus::Error => "error",
            WorkerStatus::Stalled => "stalled",
            WorkerStatus::ShuttingDown => "shutting_down",
        };
        f.write_str(name)
    }
}

/// Worker record as published on the telemetry surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub worker_id: Uuid,
    pub lane: Lane,
    pub status: WorkerStatus,
    pub current_job: Option<Uuid>,
    /// Resident memory of the process, in bytes
    pub memory_bytes: u64,
    pub cpu_percent: f32,
    pub jobs_processed: u64,
    pub jobs_failed: u64,
    pub avg_processing_ms: u64,
    pub last_heartbeat: DateTime<Utc>,
    pub last_error: Option<String>,
}

/// Everything a slot reports, consumed by the recovery coordinator
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    JobStarted {
        worker_id: Uuid,
        job: Job,
    },
    JobProgress {
        worker_id: Uuid,
        job_id: Uuid,
        user_id: String,
        percent: u8,
    },
    JobCompleted {
        worker_id: Uuid,
        lane: Lane,
        job_id: Uuid,
        user_id: String,
        result: serde_json::Value,
        duration: Duration,
        /// Change in process memory across the job, in bytes
        memory_delta: i64,
    },
    JobFailed {
        worker_id: Uuid,
        lane: Lane,
        job_id: Uuid,
        user_id: String,
        error: String,
        /// Attempts made so far, this one included
        attempts: u32,
    },
    /// Periodic snapshot; doubles as the worker's heartbeat
    Telemetry(WorkerSnapshot),
    /// Clean exit after a graceful stop
    WorkerStopped {
        worker_id: Uuid,
        lane: Lane,
    },
}

impl WorkerEvent {
    pub fn worker_id(&self) -> Uuid {
        match self {
            WorkerEvent::JobStarted { worker_id, .. }
            | WorkerEvent::JobProgress { worker_id, .. }
            | WorkerEvent::JobCompleted { worker_id, .. }
            | WorkerEvent::JobFailed { worker_id, .. }
            | WorkerEvent::WorkerStopped { worker_id, .. } => *worker_id,
            WorkerEvent::Telemetry(snapshot) => snapshot.worker_id,
        }
    }
}

/// Progress extrapolated from elapsed time, capped below completion
pub fn extrapolate_progress(elapsed: Duration, expected: Duration) -> u8 {
    if expected.is_zero() {
        return 95;
    }
    let percent = elapsed.as_secs_f64() / expected.as_secs_f64() * 100.0;
    percent.clamp(0.0, 95.0) as u8
}
