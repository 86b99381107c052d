//! Start and termination-refresh sweeps

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use common::{Harness, LONG_RUNNING};
use std::time::Duration;
use stream_conductor::models::StreamStatus;

#[tokio::test]
async fn job_that_just_came_due_is_started() {
    let h = Harness::new();
    let due = h.add_job(LONG_RUNNING, Some(Utc::now() - ChronoDuration::seconds(5))).await;
    let later = h
        .add_job(LONG_RUNNING, Some(Utc::now() + ChronoDuration::minutes(10)))
        .await;

    let report = h
        .manager
        .trigger_loop()
        .run_start_sweep(Utc::now())
        .await
        .unwrap();

    assert_eq!(report.started, vec![due.id]);
    assert!(h.manager.is_active(due.id).await);
    assert_eq!(h.status(due.id).await, StreamStatus::Live);
    assert!(!h.manager.is_active(later.id).await);

    // Already live now, so a second sweep finds nothing to do
    let again = h
        .manager
        .trigger_loop()
        .run_start_sweep(Utc::now())
        .await
        .unwrap();
    assert!(again.started.is_empty());

    assert!(h.manager.stop(due.id).await.success);
}

#[tokio::test]
async fn refresh_arms_missing_timer_and_leaves_it_alone_afterwards() {
    let h = Harness::new();
    let job = h.add_live_job(Utc::now()).await;
    h.store
        .set_end_time(job.id, Some(Utc::now() + ChronoDuration::minutes(10)))
        .await;
    let sweeps = h.manager.trigger_loop();

    let first = sweeps.run_termination_sweep(Utc::now()).await.unwrap();
    assert_eq!(first.armed, vec![job.id]);
    let scheduled = h.manager.get_scheduled_termination(job.id).unwrap();
    assert!(!scheduled.is_long_duration);
    assert!(scheduled.remaining > Duration::from_secs(590));
    assert!(scheduled.remaining <= Duration::from_secs(600));

    let second = sweeps.run_termination_sweep(Utc::now()).await.unwrap();
    assert!(second.armed.is_empty());
    assert_eq!(second.unchanged, 1);

    assert!(h.manager.cancel_termination(job.id));
}

#[tokio::test]
async fn edited_end_time_rearms_the_timer() {
    let h = Harness::new();
    let job = h.add_live_job(Utc::now()).await;
    h.store
        .set_end_time(job.id, Some(Utc::now() + ChronoDuration::minutes(10)))
        .await;
    let sweeps = h.manager.trigger_loop();
    sweeps.run_termination_sweep(Utc::now()).await.unwrap();

    let new_end = Utc::now() + ChronoDuration::minutes(20);
    h.store.set_end_time(job.id, Some(new_end)).await;
    let report = sweeps.run_termination_sweep(Utc::now()).await.unwrap();

    assert_eq!(report.armed, vec![job.id]);
    let scheduled = h.manager.get_scheduled_termination(job.id).unwrap();
    assert_eq!(scheduled.target_end_time, new_end);

    h.manager.on_job_stopped(job.id);
    assert!(h.manager.get_scheduled_termination(job.id).is_none());
}

#[tokio::test]
async fn overdue_live_job_is_stopped() {
    let h = Harness::new();
    let job = h.add_live_job(Utc::now() - ChronoDuration::minutes(30)).await;
    h.store
        .set_end_time(job.id, Some(Utc::now() - ChronoDuration::minutes(1)))
        .await;

    let report = h
        .manager
        .trigger_loop()
        .run_termination_sweep(Utc::now())
        .await
        .unwrap();

    assert_eq!(report.stopped, vec![job.id]);
    assert_eq!(h.status(job.id).await, StreamStatus::Offline);
}

#[tokio::test]
async fn manual_termination_accepts_minutes() {
    let h = Harness::new();
    let job = h.add_live_job(Utc::now()).await;

    let scheduled = h.manager.schedule_termination(job.id, 90.0).unwrap();
    assert!(!scheduled.is_long_duration);
    assert_eq!(scheduled.remaining, Duration::from_secs(90 * 60));
    assert!(h.manager.schedule_termination(job.id, f64::NAN).is_err());

    assert!(h.manager.cancel_termination(job.id));
    assert!(!h.manager.cancel_termination(job.id));
}
