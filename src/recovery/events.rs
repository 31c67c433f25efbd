//! Closed set of events the recovery manager emits to the coordinator

use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Job, JobHandle, Lane};
use crate::services::UserNotification;

/// Reply channel for a requeue; the manager awaits it inside the circuit breaker
pub type RequeueReply = oneshot::Sender<Result<JobHandle>>;

#[derive(Debug)]
pub enum RecoveryEvent {
    /// A failed job will be requeued after `delay`
    RetryScheduled {
        job: Job,
        delay: Duration,
        reason: String,
    },
    /// Resubmit a job through the router and answer on `reply`
    RequeueJob { job: Job, reply: RequeueReply },
    /// Terminal failure; `job` carries the full failure history
    JobPermanentlyFailed {
        job: Job,
        reason: String,
        /// Time since the original submission
        elapsed: Duration,
    },
    WorkerFailed {
        worker_id: Uuid,
        lane: Lane,
        affected_jobs: Vec<Uuid>,
    },
    RequestWorkerReplacement { worker_id: Uuid, lane: Lane },
    NotifyUser {
        user_id: String,
        notification: UserNotification,
    },
}

impl RecoveryEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RecoveryEvent::RetryScheduled { .. } => "retry_scheduled",
            RecoveryEvent::RequeueJob { .. } => "requeue_job",
            RecoveryEvent::JobPermanentlyFailed { .. } => "job_permanently_failed",
            RecoveryEvent::WorkerFailed { .. } => "worker_failed",
            RecoveryEvent::RequestWorkerReplacement { .. } => "request_worker_replacement",
            RecoveryEvent::NotifyUser { .. } => "notify_user",
        }
    }
}
