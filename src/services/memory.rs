//! In-memory collaborators for development and tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{JobStateUpdate, JobStore, Notifier, StoreError, SystemAlert, UserNotification};
use crate::models::{Job, JobStatus};

/// Job records kept in a concurrent map
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: DashMap<Uuid, Job>,
    updates: DashMap<Uuid, Vec<JobStateUpdate>>,
    unavailable: AtomicBool,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the database going away (or coming back)
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::Release);
    }

    pub fn get(&self, job_id: Uuid) -> Option<Job> {
        self.jobs.get(&job_id).map(|job| job.clone())
    }

    /// Every update applied to a job, oldest first
    pub fn history(&self, job_id: Uuid) -> Vec<JobStateUpdate> {
        self.updates
            .get(&job_id)
            .map(|updates| updates.clone())
            .unwrap_or_default()
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::Acquire) {
            Err(StoreError::Unavailable("in-memory store marked unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn save_job(&self, job: &Job) -> Result<(), StoreError> {
        self.ensure_available()?;
        self.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn update_job(&self, update: JobStateUpdate) -> Result<(), StoreError> {
        self.ensure_available()?;
        {
            let mut job = self
                .jobs
                .get_mut(&update.job_id)
                .ok_or(StoreError::NotFound(update.job_id))?;
            job.status = update.status;
            job.retry_count = update.retry_count;
            job.last_failure = update.failure_reason.clone();
            job.failure_history = update.failure_history.clone();
        }
        self.updates.entry(update.job_id).or_default().push(update);
        Ok(())
    }

    async fn pending_jobs(&self) -> Result<Vec<Job>, StoreError> {
        self.ensure_available()?;
        let mut pending: Vec<Job> = self
            .jobs
            .iter()
            .filter(|entry| matches!(entry.status, JobStatus::Queued | JobStatus::Active))
            .map(|entry| entry.value().clone())
            .collect();
        pending.sort_by_key(|job| job.submitted_at);
        Ok(pending)
    }
}

/// A notification as seen by subscribers
#[derive(Debug, Clone, Serialize)]
pub struct NotificationEnvelope {
    /// None for system-wide broadcasts
    pub user_id: Option<String>,
    /// Channel name, e.g. `job-started` or `worker_failed`
    pub channel: String,
    pub payload: serde_json::Value,
    pub published_at: DateTime<Utc>,
}

/// Publishes notifications on a tokio broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<NotificationEnvelope>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEnvelope> {
        self.sender.subscribe()
    }

    fn publish(&self, user_id: Option<String>, channel: &str, payload: serde_json::Value) {
        let envelope = NotificationEnvelope {
            user_id,
            channel: channel.to_string(),
            payload,
            published_at: Utc::now(),
        };
        // no subscribers is fine for fire-and-forget delivery
        let _ = self.sender.send(envelope);
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn notify_user(&self, user_id: &str, notification: UserNotification) {
        let channel = match &notification {
            UserNotification::JobStarted { .. } => "job-started",
            UserNotification::JobProgress { .. } => "job-progress",
            UserNotification::JobCompleted { .. } => "job-completed",
            UserNotification::JobFailed { .. } => "job-failed",
        };
        let payload = serde_json::to_value(&notification).unwrap_or(serde_json::Value::Null);
        self.publish(Some(user_id.to_string()), channel, payload);
    }

    async fn broadcast(&self, alert: SystemAlert) {
        let channel = match &alert {
            SystemAlert::WorkerFailed { .. } => "worker_failed",
        };
        let payload = serde_json::to_value(&alert).unwrap_or(serde_json::Value::Null);
        self.publish(None, channel, payload);
    }
}
