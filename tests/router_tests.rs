//! Lane selection, priority ordering and queue statistics through the router

mod common;

use common::{submission, MIB};
use docflow_core::config::{LanesConfig, QueueConfig};
use docflow_core::models::{JobStatus, Lane};
use docflow_core::queue::{DurableQueue, InMemoryQueue, PriorityQueueRouter};
use docflow_core::DocflowError;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn router() -> (Arc<InMemoryQueue>, PriorityQueueRouter) {
    let queue = Arc::new(InMemoryQueue::new());
    let router = PriorityQueueRouter::new(
        queue.clone(),
        QueueConfig::default(),
        LanesConfig::default(),
        Duration::from_secs(30),
    );
    (queue, router)
}

#[tokio::test]
async fn test_submission_lane_and_priority_by_tier_and_size() {
    let (_queue, router) = router();

    let cases = [
        ("free", 1024, Lane::Normal, 3),
        ("pro", 1024, Lane::Premium, 2),
        ("pro", 60 * MIB, Lane::Large, 2),
        ("unlimited", 1024, Lane::Premium, 1),
        ("ilimitado", 1024, Lane::Premium, 1),
        ("enterprise", 10 * MIB, Lane::Premium, 2),
        ("free", 60 * MIB, Lane::Large, 3),
        ("trial", 1024, Lane::Normal, 3),
    ];

    for (tier, size, lane, priority) in cases {
        let handle = router.submit(submission("u1", tier, size)).await.unwrap();
        assert_eq!(handle.lane, lane, "tier={tier} size={size}");
        assert_eq!(handle.priority, priority, "tier={tier} size={size}");
    }
}

#[tokio::test]
async fn test_premium_lane_unaffected_by_normal_backlog() {
    let (queue, router) = router();

    for i in 0..200 {
        router
            .submit(submission(&format!("free-{i}"), "free", 1024))
            .await
            .unwrap();
    }
    let pro = router.submit(submission("paying", "pro", 1024)).await.unwrap();

    let next = queue.dequeue(Lane::Premium).await.unwrap().unwrap();
    assert_eq!(next.id, pro.job_id);
    assert_eq!(queue.stats(Lane::Normal).await.unwrap().waiting, 200);
}

#[tokio::test]
async fn test_large_lane_is_priority_then_fifo() {
    let (queue, router) = router();

    let first_free = router.submit(submission("a", "free", 80 * MIB)).await.unwrap();
    let second_free = router.submit(submission("b", "basic", 80 * MIB)).await.unwrap();
    let pro = router.submit(submission("c", "pro", 80 * MIB)).await.unwrap();
    let unlimited = router
        .submit(submission("d", "unlimited", 80 * MIB))
        .await
        .unwrap();

    let order: Vec<_> = queue
        .waiting_jobs(Lane::Large)
        .into_iter()
        .map(|job| job.id)
        .collect();
    assert_eq!(
        order,
        vec![unlimited.job_id, pro.job_id, first_free.job_id, second_free.job_id]
    );
}

#[tokio::test]
async fn test_unavailable_queue_rejects_submission() {
    let (queue, router) = router();
    queue.set_available(false);

    let err = assert_err!(router.submit(submission("u1", "pro", 1024)).await);
    assert!(matches!(err, DocflowError::QueueUnavailable { .. }));

    queue.set_available(true);
    assert_eq!(queue.stats(Lane::Premium).await.unwrap().waiting, 0);
}

#[tokio::test]
async fn test_cancel_removes_waiting_job_only_once() {
    let (queue, router) = router();
    let handle = router.submit(submission("u1", "free", 1024)).await.unwrap();

    assert!(assert_ok!(router.cancel(handle.job_id, handle.lane).await));
    assert!(!assert_ok!(router.cancel(handle.job_id, handle.lane).await));
    assert!(queue.dequeue(Lane::Normal).await.unwrap().is_none());
}

#[tokio::test]
async fn test_resubmitted_job_is_queued_again() {
    let (queue, router) = router();
    let handle = router.submit(submission("u1", "free", 1024)).await.unwrap();
    let mut job = queue.dequeue(handle.lane).await.unwrap().unwrap();
    job.status = JobStatus::Active;
    job.record_failure(None, "converter crashed");

    router.resubmit(job).await.unwrap();

    let again = queue.dequeue(Lane::Normal).await.unwrap().unwrap();
    assert_eq!(again.id, handle.job_id);
    assert_eq!(again.status, JobStatus::Queued);
    assert_eq!(again.failure_history.len(), 1);
}

#[tokio::test]
async fn test_lane_stats_track_outcomes_and_wait_estimate() {
    let (queue, router) = router();
    for i in 0..4 {
        router
            .submit(submission(&format!("u{i}"), "free", 1024))
            .await
            .unwrap();
    }
    queue.dequeue(Lane::Normal).await.unwrap();

    router.record_outcome(Lane::Normal, true, Some(Duration::from_secs(10)));
    router.record_outcome(Lane::Normal, true, Some(Duration::from_secs(30)));
    router.record_outcome(Lane::Normal, false, None);

    let stats = router.lane_stats(Lane::Normal).await.unwrap();
    assert_eq!(stats.waiting, 3);
    assert_eq!(stats.active, 1);
    assert_eq!(stats.completed_last_hour, 2);
    assert_eq!(stats.failed_last_hour, 1);
    assert!((stats.error_rate - 1.0 / 3.0).abs() < 1e-9);
    assert_eq!(stats.avg_processing_ms, 20_000);
    // 3 waiting * 20s average over 2 normal slots
    assert_eq!(stats.estimated_wait_ms, 30_000);

    let all = router.stats().await.unwrap();
    assert_eq!(all.len(), 3);
}

#[test]
fn test_queue_configuration_keeps_premium_workers() {
    let queue = Arc::new(InMemoryQueue::new());
    let mut lanes = LanesConfig::default();
    lanes.premium.concurrency = 1;
    let router = PriorityQueueRouter::new(
        queue,
        QueueConfig::default(),
        lanes,
        Duration::from_secs(30),
    );

    let relaxed = router.queue_configuration(0.2);
    assert_eq!(relaxed.workers_for(Lane::Premium), 2);
    assert_eq!(relaxed.workers_for(Lane::Normal), 2);
    assert_eq!(relaxed.workers_for(Lane::Large), 1);

    let loaded = router.queue_configuration(0.95);
    assert_eq!(loaded.workers_for(Lane::Premium), 1);
}
