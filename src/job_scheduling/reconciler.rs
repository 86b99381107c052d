//! Periodic repair of drift between stored stream status and the process table
//!
//! The store is trusted for whether a job exists; the process table is trusted
//! for whether a process is actually running. Every sweep keeps going after a
//! per-job failure.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ReconcilerConfig;
use crate::errors::{StreamError, StreamResult};
use crate::models::{StatusUpdateOptions, StreamJob, StreamStatus};
use crate::repositories::StreamJobStore;
use crate::services::StreamSupervisor;
use crate::utils::time::subtract_duration;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StatusSyncReport {
    pub marked_offline: Vec<Uuid>,
    pub marked_live: Vec<Uuid>,
    pub orphans_killed: Vec<Uuid>,
    pub reaped: Vec<Uuid>,
    pub skipped: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub reaped: Vec<Uuid>,
    pub retry_resets: usize,
}

pub struct StreamReconciler {
    supervisor: Arc<StreamSupervisor>,
    store: Arc<dyn StreamJobStore>,
    config: ReconcilerConfig,
}

impl StreamReconciler {
    pub fn new(
        supervisor: Arc<StreamSupervisor>,
        store: Arc<dyn StreamJobStore>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            supervisor,
            store,
            config,
        }
    }

    pub async fn run(&self, cancellation_token: CancellationToken) {
        info!("Starting stream reconciler");
        let mut status_sync = interval(self.config.status_sync_interval);
        let mut health_check = interval(self.config.health_check_interval);
        let mut log_cleanup = interval(self.config.log_cleanup_interval);
        for timer in [&mut status_sync, &mut health_check, &mut log_cleanup] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Skip the immediate tick; the trigger loop already runs at startup
            timer.tick().await;
        }

        loop {
            tokio::select! {
                _ = status_sync.tick() => {
                    if let Err(e) = self.sync_statuses(Utc::now()).await {
                        error!("Error synchronising stream statuses: {}", e);
                    }
                }
                _ = health_check.tick() => {
                    let report = self.health_check().await;
                    if !report.reaped.is_empty() || report.retry_resets > 0 {
                        debug!("Health check: {:?}", report);
                    }
                }
                _ = log_cleanup.tick() => {
                    let removed = self.supervisor.cleanup_stale_logs().await;
                    if removed > 0 {
                        info!("Removed {} stale stream log buffers", removed);
                    }
                }
                _ = cancellation_token.cancelled() => {
                    info!("Stream reconciler received cancellation signal, shutting down");
                    break;
                }
            }
        }

        info!("Stream reconciler stopped");
    }

    /// Bring stored status and the process table back in agreement.
    pub async fn sync_statuses(&self, now: DateTime<Utc>) -> StreamResult<StatusSyncReport> {
        let mut report = StatusSyncReport::default();
        let tracked = self.supervisor.tracked_processes().await;
        // Includes processes whose exit is still being handled
        let running: HashSet<Uuid> = tracked
            .iter()
            .filter(|p| !p.settled)
            .map(|p| p.job_id)
            .collect();

        let live_jobs = self.store.find_all(None, Some(StreamStatus::Live)).await?;
        for job in live_jobs.iter().filter(|job| !running.contains(&job.id)) {
            if self.supervisor.is_retrying(job.id).await {
                debug!("Stream {} is waiting to retry, leaving it live", job.id);
                report.skipped += 1;
                continue;
            }
            if self.within_grace(job, now) {
                debug!("Stream {} went live moments ago, leaving it", job.id);
                report.skipped += 1;
                continue;
            }

            warn!(
                "{}",
                StreamError::drift(job.id, "marked live but no process is running")
            );
            match self.write_status(job.id, StreamStatus::Offline, None).await {
                Ok(()) => {
                    self.supervisor.clear_bookkeeping(job.id).await;
                    report.marked_offline.push(job.id);
                }
                Err(e) => error!("Failed to correct stream {} to offline: {}", job.id, e),
            }
        }

        for process in tracked {
            if process.exited {
                if self.supervisor.reap_exited(process.job_id).await {
                    self.settle_exited(process.job_id).await;
                    report.reaped.push(process.job_id);
                }
                continue;
            }

            match self.store.find_by_id(process.job_id).await {
                Ok(None) => match self.supervisor.terminate_orphan(process.job_id).await {
                    Ok(pid) => {
                        warn!(
                            "{}",
                            StreamError::OrphanProcess {
                                job_id: process.job_id,
                                pid,
                            }
                        );
                        report.orphans_killed.push(process.job_id);
                    }
                    Err(e) => error!(
                        "Failed to kill orphaned process of stream {}: {}",
                        process.job_id, e
                    ),
                },
                Ok(Some(job)) if !job.is_live() => {
                    warn!(
                        "{}",
                        StreamError::drift(job.id, format!("process running but stored as {}", job.status))
                    );
                    match self
                        .write_status(job.id, StreamStatus::Live, Some(process.started_at))
                        .await
                    {
                        Ok(()) => report.marked_live.push(job.id),
                        Err(e) => error!("Failed to correct stream {} to live: {}", job.id, e),
                    }
                }
                Ok(Some(_)) => {}
                Err(e) => warn!("Failed to read stream {}: {}", process.job_id, e),
            }
        }

        if !report.marked_offline.is_empty()
            || !report.marked_live.is_empty()
            || !report.orphans_killed.is_empty()
        {
            info!(
                "Status sync corrected {} offline, {} live, killed {} orphans",
                report.marked_offline.len(),
                report.marked_live.len(),
                report.orphans_killed.len()
            );
        }
        Ok(report)
    }

    /// Clean up exited processes whose exit was never handled and forgive
    /// retry counters of streams that have been running long enough.
    pub async fn health_check(&self) -> HealthReport {
        let mut report = HealthReport::default();
        for process in self.supervisor.tracked_processes().await {
            if process.exited && self.supervisor.reap_exited(process.job_id).await {
                warn!(
                    "Process of stream {} exited without being cleaned up",
                    process.job_id
                );
                self.settle_exited(process.job_id).await;
                report.reaped.push(process.job_id);
            }
        }
        report.retry_resets = self.supervisor.forgive_sustained_runs().await;
        report
    }

    pub async fn cleanup_logs(&self) -> usize {
        self.supervisor.cleanup_stale_logs().await
    }

    fn within_grace(&self, job: &StreamJob, now: DateTime<Utc>) -> bool {
        let cutoff = subtract_duration(now, self.config.start_grace_period);
        job.start_time.is_some_and(|started| started > cutoff)
    }

    async fn settle_exited(&self, job_id: Uuid) {
        match self.store.find_by_id(job_id).await {
            Ok(Some(job)) if job.is_live() => {
                if let Err(e) = self.write_status(job_id, StreamStatus::Offline, None).await {
                    error!("Failed to mark exited stream {} offline: {}", job_id, e);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to read stream {}: {}", job_id, e),
        }
        self.supervisor.clear_bookkeeping(job_id).await;
    }

    async fn write_status(
        &self,
        job_id: Uuid,
        status: StreamStatus,
        started_at: Option<DateTime<Utc>>,
    ) -> StreamResult<()> {
        let options = started_at
            .map(StatusUpdateOptions::started_at)
            .unwrap_or_default();
        self.store
            .update_status(job_id, status, None, options)
            .await?;
        Ok(())
    }
}
