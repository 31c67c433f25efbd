//! # External Collaborators
//!
//! Seams to the parts of the system the scheduling core produces to:
//! persistence of job records, user/system notifications and worker
//! lifecycle management. In-memory implementations back development and
//! tests.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{FailureRecord, Job, JobStatus, Lane};

pub use memory::{BroadcastNotifier, InMemoryJobStore, NotificationEnvelope};

/// Persistence collaborator failures
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Job not found: {0}")]
    NotFound(Uuid),
}

/// Status/metadata update keyed by job id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStateUpdate {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub worker_id: Option<Uuid>,
    pub retry_count: u32,
    pub failure_reason: Option<String>,
    pub failure_history: Vec<FailureRecord>,
    /// Result payload for completed jobs
    pub result: Option<serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

impl JobStateUpdate {
    /// Update carrying the job's own retry count and failure history
    pub fn for_job(job: &Job, status: JobStatus, worker_id: Option<Uuid>) -> Self {
        Self {
            job_id: job.id,
            status,
            worker_id,
            retry_count: job.retry_count,
            failure_reason: job.last_failure.clone(),
            failure_history: job.failure_history.clone(),
            result: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_failure_reason(mut self, reason: impl Into<String>) -> Self {
        self.failure_reason = Some(reason.into());
        self
    }
}

/// Persistence of job records, owned outside the core
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create or replace the stored record of a job
    async fn save_job(&self, job: &Job) -> Result<(), StoreError>;

    async fn update_job(&self, update: JobStateUpdate) -> Result<(), StoreError>;

    /// Every job whose stored status is queued or active
    async fn pending_jobs(&self) -> Result<Vec<Job>, StoreError>;
}

/// User-facing job events, delivered by user id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum UserNotification {
    JobStarted {
        job_id: Uuid,
    },
    JobProgress {
        job_id: Uuid,
        percent: u8,
    },
    JobCompleted {
        job_id: Uuid,
        result: serde_json::Value,
    },
    JobFailed {
        job_id: Uuid,
        reason: String,
        /// False once the failure is permanent
        will_retry: bool,
    },
}

/// System-wide alerts broadcast to operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SystemAlert {
    WorkerFailed {
        worker_id: Uuid,
        lane: Lane,
        affected_jobs: Vec<Uuid>,
    },
}

/// Fire-and-forget notification delivery
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_user(&self, user_id: &str, notification: UserNotification);

    async fn broadcast(&self, alert: SystemAlert);
}

/// Worker replacement, usually implemented by the worker pool
#[async_trait]
pub trait WorkerLifecycle: Send + Sync {
    /// Spin up a fresh worker in the failed worker's lane, returning its id
    async fn replace_worker(&self, failed_worker_id: Uuid, lane: Lane) -> crate::error::Result<Uuid>;
}
