//! # Job Model
//!
//! The unit of work scheduled by the core. The in-memory view of a job is
//! transient: it is rebuilt from the durable queue plus persisted state, and
//! only the persistence collaborator ever archives or deletes a job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{Lane, SubscriptionTier};

/// Lifecycle status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Active,
    Completed,
    Failed,
}

impl JobStatus {
    /// Completed and failed jobs are never scheduled again
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Queued => "queued",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One recorded failure of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Worker that owned the job when it failed, if any
    pub worker_id: Option<Uuid>,
    pub failed_at: DateTime<Utc>,
    pub reason: String,
}

/// Input to a submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSubmission {
    pub user_id: String,
    /// Opaque handle to the uploaded artifact
    pub payload_ref: String,
    pub tier: SubscriptionTier,
    pub size_bytes: u64,
}

impl JobSubmission {
    pub fn new(
        user_id: impl Into<String>,
        payload_ref: impl Into<String>,
        tier: impl Into<SubscriptionTier>,
        size_bytes: u64,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            payload_ref: payload_ref.into(),
            tier: tier.into(),
            size_bytes,
        }
    }
}

/// Receipt returned to the caller of `submit`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: Uuid,
    pub lane: Lane,
    pub priority: u8,
    pub submitted_at: DateTime<Utc>,
}

/// A scheduled unit of document conversion work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub user_id: String,
    pub payload_ref: String,
    pub size_bytes: u64,
    pub tier: SubscriptionTier,
    pub lane: Lane,
    /// Lower is served first
    pub priority: u8,
    pub submitted_at: DateTime<Utc>,
    pub status: JobStatus,
    /// Number of failures recorded so far
    pub retry_count: u32,
    pub last_failure: Option<String>,
    pub failure_history: Vec<FailureRecord>,
}

impl Job {
    /// Build a queued job from a submission with an already-selected lane and priority
    pub fn from_submission(submission: JobSubmission, lane: Lane, priority: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: submission.user_id,
            payload_ref: submission.payload_ref,
            size_bytes: submission.size_bytes,
            tier: submission.tier,
            lane,
            priority,
            submitted_at: Utc::now(),
            status: JobStatus::Queued,
            retry_count: 0,
            last_failure: None,
            failure_history: Vec::new(),
        }
    }

    pub fn handle(&self) -> JobHandle {
        JobHandle {
            job_id: self.id,
            lane: self.lane,
            priority: self.priority,
            submitted_at: self.submitted_at,
        }
    }

    /// Record a failure and bump the retry count by exactly one
    pub fn record_failure(&mut self, worker_id: Option<Uuid>, reason: impl Into<String>) {
        let reason = reason.into();
        self.retry_count += 1;
        self.last_failure = Some(reason.clone());
        self.failure_history.push(FailureRecord {
            worker_id,
            failed_at: Utc::now(),
            reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_failure_appends_history() {
        let submission = JobSubmission::new("user-1", "uploads/a.pdf", "free", 1024);
        let mut job = Job::from_submission(submission, Lane::Normal, 3);
        let worker = Uuid::new_v4();

        job.record_failure(Some(worker), "converter crashed");
        job.record_failure(None, "job timeout");

        assert_eq!(job.retry_count, 2);
        assert_eq!(job.last_failure.as_deref(), Some("job timeout"));
        assert_eq!(job.failure_history.len(), 2);
        assert_eq!(job.failure_history[0].worker_id, Some(worker));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Active.is_terminal());
    }
}
