//! End-to-end runs of the assembled scheduling core on a paused clock

mod common;

use common::{fast_config, submission, Script, ScriptedProcessor};
use docflow_core::bootstrap::{Collaborators, SchedulingSystem};
use docflow_core::config::{ConfigManager, DocflowConfig};
use docflow_core::models::{Job, JobStatus, Lane};
use docflow_core::queue::InMemoryQueue;
use docflow_core::services::{BroadcastNotifier, InMemoryJobStore, JobStore, NotificationEnvelope};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

struct Harness {
    system: SchedulingSystem,
    store: Arc<InMemoryJobStore>,
    processor: Arc<ScriptedProcessor>,
    notifications: broadcast::Receiver<NotificationEnvelope>,
}

async fn start_with(store: Arc<InMemoryJobStore>, processor: Arc<ScriptedProcessor>) -> (Harness, docflow_core::RecoveryReport) {
    start_with_config(fast_config(), store, processor).await
}

async fn start_with_config(
    config: DocflowConfig,
    store: Arc<InMemoryJobStore>,
    processor: Arc<ScriptedProcessor>,
) -> (Harness, docflow_core::RecoveryReport) {
    let manager = ConfigManager::from_config(config, "test").unwrap();
    let notifier = BroadcastNotifier::default();
    let notifications = notifier.subscribe();
    let collaborators = Collaborators {
        queue: Arc::new(InMemoryQueue::new()),
        processor: processor.clone(),
        store: store.clone(),
        notifier: Arc::new(notifier),
    };

    let (system, report) = SchedulingSystem::start(&manager, collaborators).await.unwrap();
    (
        Harness {
            system,
            store,
            processor,
            notifications,
        },
        report,
    )
}

async fn start() -> Harness {
    let processor = Arc::new(ScriptedProcessor::new(Duration::from_millis(100)));
    start_with(Arc::new(InMemoryJobStore::new()), processor).await.0
}

async fn wait_for_status(store: &InMemoryJobStore, job_id: Uuid, status: JobStatus) -> Job {
    for _ in 0..1_000 {
        if let Some(job) = store.get(job_id) {
            if job.status == status {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "job {job_id} never reached {status}; last seen {:?}",
        store.get(job_id).map(|job| job.status)
    );
}

fn channels_for(rx: &mut broadcast::Receiver<NotificationEnvelope>, user: &str) -> Vec<String> {
    let mut channels = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        if envelope.user_id.as_deref() == Some(user) {
            channels.push(envelope.channel);
        }
    }
    channels
}

#[tokio::test(start_paused = true)]
async fn test_submitted_job_runs_to_completion() {
    let mut harness = start().await;

    let handle = harness
        .system
        .submit(submission("alice", "pro", 2 * 1024 * 1024))
        .await
        .unwrap();
    assert_eq!(handle.lane, Lane::Premium);
    assert_eq!(harness.store.get(handle.job_id).unwrap().status, JobStatus::Queued);

    wait_for_status(&harness.store, handle.job_id, JobStatus::Completed).await;

    let statuses: Vec<JobStatus> = harness
        .store
        .history(handle.job_id)
        .into_iter()
        .map(|update| update.status)
        .collect();
    assert_eq!(statuses, vec![JobStatus::Active, JobStatus::Completed]);
    let completed = harness.store.history(handle.job_id).pop().unwrap();
    assert!(completed.result.is_some());

    let channels = channels_for(&mut harness.notifications, "alice");
    assert_eq!(channels.first().map(String::as_str), Some("job-started"));
    assert_eq!(channels.last().map(String::as_str), Some("job-completed"));

    let status = harness.system.status().await.unwrap();
    assert!(status.running);
    assert_eq!(status.recovery.active_jobs, 0);
    let premium = status.lanes.iter().find(|s| s.lane == Lane::Premium).unwrap();
    assert_eq!(premium.completed_last_hour, 1);

    let summary = harness.system.shutdown().await.unwrap();
    assert_eq!(summary.graceful, 4);
    assert_eq!(summary.forced, 0);
    assert!(!harness.system.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_flaky_job_is_retried_until_it_succeeds() {
    let harness = start().await;
    harness
        .processor
        .script("uploads/bob.pdf", Script::FailTimes(2));

    let handle = harness
        .system
        .submit(submission("bob", "free", 1024))
        .await
        .unwrap();
    let job = wait_for_status(&harness.store, handle.job_id, JobStatus::Completed).await;

    assert_eq!(harness.processor.calls_for("uploads/bob.pdf"), 3);
    assert_eq!(job.retry_count, 2);
    assert_eq!(job.failure_history.len(), 2);

    harness.system.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failing_job_exhausts_retries() {
    let mut harness = start().await;
    harness
        .processor
        .script("uploads/carol.pdf", Script::AlwaysFail);

    let handle = harness
        .system
        .submit(submission("carol", "enterprise", 1024))
        .await
        .unwrap();
    let job = wait_for_status(&harness.store, handle.job_id, JobStatus::Failed).await;

    // give any stray retry a chance to show up
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.processor.calls_for("uploads/carol.pdf"), 3);
    assert_eq!(job.retry_count, 3);
    assert!(job.last_failure.is_some());
    assert_eq!(harness.system.manager().recovery_stats().permanently_failed, 1);

    let channels = channels_for(&mut harness.notifications, "carol");
    assert_eq!(channels.iter().filter(|c| *c == "job-failed").count(), 3);
    assert!(!channels.iter().any(|c| c == "job-completed"));

    harness.system.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_panicking_processor_counts_as_failure() {
    let harness = start().await;
    harness.processor.script("uploads/dave.pdf", Script::Panic);

    let handle = harness
        .system
        .submit(submission("dave", "free", 1024))
        .await
        .unwrap();
    let job = wait_for_status(&harness.store, handle.job_id, JobStatus::Failed).await;

    assert_eq!(job.failure_history.len(), 3);
    // the slots survived the panics and keep serving
    let next = harness
        .system
        .submit(submission("erin", "free", 1024))
        .await
        .unwrap();
    wait_for_status(&harness.store, next.job_id, JobStatus::Completed).await;

    harness.system.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_startup_recovers_jobs_persisted_by_previous_run() {
    let store = Arc::new(InMemoryJobStore::new());
    let orphan = Job::from_submission(submission("frank", "unlimited", 1024), Lane::Premium, 1);
    let mut finished = Job::from_submission(submission("grace", "free", 1024), Lane::Normal, 3);
    finished.status = JobStatus::Completed;
    store.save_job(&orphan).await.unwrap();
    store.save_job(&finished).await.unwrap();

    let processor = Arc::new(ScriptedProcessor::new(Duration::from_millis(100)));
    let (harness, report) = start_with(store, processor).await;
    assert_eq!(report.requeued, 1);
    assert_eq!(report.permanently_failed, 0);

    wait_for_status(&harness.store, orphan.id, JobStatus::Completed).await;
    assert_eq!(harness.processor.calls_for("uploads/grace.pdf"), 0);

    harness.system.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_store_rejects_submission() {
    let harness = start().await;
    harness.store.set_available(false);

    let result = harness.system.submit(submission("heidi", "pro", 1024)).await;
    assert!(result.is_err());
    assert_eq!(harness.processor.total_calls(), 0);

    harness.store.set_available(true);
    harness.system.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_forces_hung_worker_after_grace_period() {
    let harness = start().await;
    harness.processor.script("uploads/ivan.pdf", Script::Hang);

    let handle = harness
        .system
        .submit(submission("ivan", "free", 1024))
        .await
        .unwrap();
    wait_for_status(&harness.store, handle.job_id, JobStatus::Active).await;

    let summary = harness.system.shutdown().await.unwrap();
    assert_eq!(summary.forced, 1);
    assert_eq!(summary.graceful, 3);
    // never completed, so the next start would recover it
    assert_eq!(
        harness.store.get(handle.job_id).unwrap().status,
        JobStatus::Active
    );
}

#[tokio::test(start_paused = true)]
async fn test_killed_worker_is_replaced_and_its_job_rerouted() {
    let processor = Arc::new(ScriptedProcessor::new(Duration::from_millis(500)));
    let (mut harness, _) = start_with(Arc::new(InMemoryJobStore::new()), processor).await;

    let handle = harness
        .system
        .submit(submission("judy", "free", 1024))
        .await
        .unwrap();
    assert_eq!(handle.lane, Lane::Normal);
    wait_for_status(&harness.store, handle.job_id, JobStatus::Active).await;

    let doomed = harness.system.manager().owner_of(handle.job_id).unwrap();
    assert_eq!(harness.system.pool().worker_ids(Lane::Normal), vec![doomed]);
    assert!(harness.system.pool().kill_worker(doomed));

    let job = wait_for_status(&harness.store, handle.job_id, JobStatus::Completed).await;
    assert_eq!(job.retry_count, 1);
    let reasons: Vec<&str> = job
        .failure_history
        .iter()
        .map(|failure| failure.reason.as_str())
        .collect();
    assert_eq!(reasons, vec!["worker failed"]);
    assert_eq!(job.failure_history[0].worker_id, Some(doomed));
    assert_eq!(harness.processor.calls_for("uploads/judy.pdf"), 2);

    let normal_workers = harness.system.pool().worker_ids(Lane::Normal);
    assert_eq!(normal_workers.len(), 1);
    assert_ne!(normal_workers[0], doomed);
    assert!(!harness.system.manager().is_worker_failed(doomed));
    assert_eq!(harness.system.manager().recovery_stats().failed_workers, 0);

    let mut alerts = Vec::new();
    while let Ok(envelope) = harness.notifications.try_recv() {
        if envelope.user_id.is_none() {
            alerts.push(envelope.channel);
        }
    }
    assert_eq!(alerts, vec!["worker_failed".to_string()]);

    let normal = harness.system.router().lane_stats(Lane::Normal).await.unwrap();
    assert_eq!(normal.active, 0);

    let summary = harness.system.shutdown().await.unwrap();
    assert_eq!(summary.graceful, 4);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_delivery_is_released_on_permanent_failure() {
    let mut config = fast_config();
    config.recovery.max_retries = 1;
    let processor = Arc::new(ScriptedProcessor::new(Duration::from_millis(100)));
    processor.script("uploads/kim.pdf", Script::Hang);
    let (harness, _) = start_with_config(config, Arc::new(InMemoryJobStore::new()), processor).await;

    let handle = harness
        .system
        .submit(submission("kim", "free", 1024))
        .await
        .unwrap();
    wait_for_status(&harness.store, handle.job_id, JobStatus::Active).await;
    assert_eq!(
        harness.system.router().lane_stats(Lane::Normal).await.unwrap().active,
        1
    );

    // the slot is still stuck in the processor when the job times out
    let job = wait_for_status(&harness.store, handle.job_id, JobStatus::Failed).await;
    assert_eq!(job.last_failure.as_deref(), Some("job timeout"));
    assert_eq!(
        harness.system.router().lane_stats(Lane::Normal).await.unwrap().active,
        0
    );

    let summary = harness.system.shutdown().await.unwrap();
    assert_eq!(summary.forced, 1);
}
