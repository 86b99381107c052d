//! Status sync and health sweeps

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{Harness, LONG_RUNNING};
use stream_conductor::models::{StatusUpdateOptions, StreamStatus};
use stream_conductor::repositories::StreamJobStore;

#[tokio::test]
async fn stale_live_job_without_process_goes_offline() {
    let h = Harness::new();
    let job = h.add_live_job(Utc::now() - ChronoDuration::minutes(10)).await;

    let report = h.manager.sync_statuses().await.unwrap();

    assert_eq!(report.marked_offline, vec![job.id]);
    assert_eq!(h.status(job.id).await, StreamStatus::Offline);
}

#[tokio::test]
async fn recently_started_job_is_left_alone() {
    let h = Harness::new();
    let job = h.add_live_job(Utc::now() - ChronoDuration::seconds(5)).await;

    let report = h.manager.sync_statuses().await.unwrap();

    assert!(report.marked_offline.is_empty());
    assert_eq!(report.skipped, 1);
    assert_eq!(h.status(job.id).await, StreamStatus::Live);
}

#[tokio::test]
async fn process_of_deleted_job_is_killed() {
    let h = Harness::new();
    let job = h.add_job(LONG_RUNNING, None).await;
    assert!(h.manager.start(job.id).await.success);
    h.store.remove_job(job.id).await;

    let report = h.manager.sync_statuses().await.unwrap();

    assert_eq!(report.orphans_killed, vec![job.id]);
    assert!(!h.manager.is_active(job.id).await);
    assert!(h.manager.list_active().await.is_empty());
}

#[tokio::test]
async fn running_process_restores_live_status() {
    let h = Harness::new();
    let job = h.add_job(LONG_RUNNING, None).await;
    assert!(h.manager.start(job.id).await.success);
    let started_at = h.job(job.id).await.start_time;

    h.store
        .update_status(job.id, StreamStatus::Scheduled, None, StatusUpdateOptions::default())
        .await
        .unwrap();

    let report = h.manager.sync_statuses().await.unwrap();

    assert_eq!(report.marked_live, vec![job.id]);
    let healed = h.job(job.id).await;
    assert_eq!(healed.status, StreamStatus::Live);
    assert_eq!(healed.start_time, started_at);

    assert!(h.manager.stop(job.id).await.success);
}

#[tokio::test]
async fn consistent_state_needs_no_correction() {
    let h = Harness::new();
    let job = h.add_job(LONG_RUNNING, None).await;
    assert!(h.manager.start(job.id).await.success);

    let report = h.manager.sync_statuses().await.unwrap();
    assert!(report.marked_offline.is_empty());
    assert!(report.marked_live.is_empty());
    assert!(report.orphans_killed.is_empty());

    let health = h.manager.health_check().await;
    assert!(health.reaped.is_empty());
    assert_eq!(health.retry_resets, 0);
    assert!(h.manager.is_active(job.id).await);

    assert!(h.manager.stop(job.id).await.success);
}

#[tokio::test]
async fn failed_live_write_is_healed_by_status_sync() {
    let h = Harness::new();
    let job = h.add_job(LONG_RUNNING, None).await;

    h.store.set_fail_writes(true);
    assert!(h.manager.start(job.id).await.success);
    assert!(h.manager.is_active(job.id).await);
    assert_eq!(h.status(job.id).await, StreamStatus::Scheduled);
    assert_eq!(h.count_logs(job.id, "Failed to record live status").await, 1);

    h.store.set_fail_writes(false);
    let report = h.manager.sync_statuses().await.unwrap();
    assert_eq!(report.marked_live, vec![job.id]);
    assert_eq!(h.status(job.id).await, StreamStatus::Live);

    assert!(h.manager.stop(job.id).await.success);
}
