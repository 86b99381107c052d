//! Trigger loop: starts streams when their schedule comes due and keeps
//! termination timers aligned with the stored end times of live streams.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::termination_scheduler::TerminationScheduler;
use crate::config::SchedulerConfig;
use crate::errors::StreamResult;
use crate::models::{StreamJob, StreamStatus};
use crate::repositories::StreamJobStore;
use crate::services::StreamSupervisor;
use crate::utils::time::{abs_difference, add_duration, subtract_duration};

/// Outcome of one start sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StartSweepReport {
    pub candidates: usize,
    pub started: Vec<Uuid>,
    pub skipped: usize,
    pub failed: usize,
}

/// Outcome of one termination-refresh sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TerminationSweepReport {
    pub live: usize,
    pub stopped: Vec<Uuid>,
    pub armed: Vec<Uuid>,
    pub unchanged: usize,
}

pub struct StreamTriggerLoop {
    supervisor: Arc<StreamSupervisor>,
    store: Arc<dyn StreamJobStore>,
    config: SchedulerConfig,
}

impl StreamTriggerLoop {
    pub fn new(
        supervisor: Arc<StreamSupervisor>,
        store: Arc<dyn StreamJobStore>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            supervisor,
            store,
            config,
        }
    }

    fn terminations(&self) -> &Arc<TerminationScheduler> {
        self.supervisor.terminations()
    }

    /// Run both sweeps every `poll_interval` until cancelled. The first sweep runs immediately.
    pub async fn run(&self, cancellation_token: CancellationToken) {
        info!(
            "Starting stream trigger loop (poll interval {})",
            humantime::format_duration(self.config.poll_interval)
        );
        let mut start_check = interval(self.config.poll_interval);
        let mut termination_check = interval(self.config.poll_interval);
        start_check.set_missed_tick_behavior(MissedTickBehavior::Delay);
        termination_check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = start_check.tick() => {
                    if let Err(e) = self.run_start_sweep(Utc::now()).await {
                        error!("Error starting scheduled streams: {}", e);
                    }
                }
                _ = termination_check.tick() => {
                    if let Err(e) = self.run_termination_sweep(Utc::now()).await {
                        error!("Error refreshing stream terminations: {}", e);
                    }
                }
                _ = cancellation_token.cancelled() => {
                    info!("Stream trigger loop received cancellation signal, shutting down");
                    break;
                }
            }
        }

        info!("Stream trigger loop stopped");
    }

    /// Start every scheduled job whose start time falls inside
    /// `[now - poll_interval, now + start_lookahead]`.
    pub async fn run_start_sweep(&self, now: DateTime<Utc>) -> StreamResult<StartSweepReport> {
        let from = subtract_duration(now, self.config.poll_interval);
        let to = add_duration(now, self.config.start_lookahead);
        let jobs = self.store.find_scheduled_in_range(from, to).await?;

        let mut report = StartSweepReport {
            candidates: jobs.len(),
            ..Default::default()
        };
        if !jobs.is_empty() {
            debug!(
                "Found {} streams due between {} and {}",
                jobs.len(),
                from.format("%Y-%m-%d %H:%M:%S UTC"),
                to.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }

        for job in jobs {
            if self.supervisor.is_active(job.id).await {
                debug!("Stream {} is already running, skipping", job.id);
                report.skipped += 1;
                continue;
            }

            // Someone may have changed the job since the range query
            match self.store.find_by_id(job.id).await {
                Ok(Some(current)) if current.status == StreamStatus::Scheduled => {}
                Ok(_) => {
                    debug!("Stream {} is no longer scheduled, skipping", job.id);
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!("Failed to re-read stream {}: {}", job.id, e);
                    report.failed += 1;
                    continue;
                }
            }

            info!("Starting scheduled stream '{}' ({})", job.title, job.id);
            let result = self.supervisor.start(job.id).await;
            if result.success {
                report.started.push(job.id);
            } else {
                warn!(
                    "Failed to start scheduled stream {}: {}",
                    job.id,
                    result.error.unwrap_or_default()
                );
                report.failed += 1;
            }
        }

        Ok(report)
    }

    /// Stop live jobs past their end time and re-arm timers that are missing or drifted.
    pub async fn run_termination_sweep(
        &self,
        now: DateTime<Utc>,
    ) -> StreamResult<TerminationSweepReport> {
        let jobs = self.store.find_all(None, Some(StreamStatus::Live)).await?;
        let mut report = TerminationSweepReport {
            live: jobs.len(),
            ..Default::default()
        };

        for job in jobs {
            let Some(end_time) = job.end_time else {
                report.unchanged += 1;
                continue;
            };

            if end_time <= now {
                self.stop_overdue(&job, end_time).await;
                report.stopped.push(job.id);
                continue;
            }

            let needs_arming = match self.terminations().get(job.id) {
                Some(existing) => {
                    abs_difference(existing.target_end_time, end_time)
                        > self.config.termination_tolerance
                }
                None => true,
            };
            if needs_arming {
                debug!(
                    "Refreshing termination timer for stream {} (end time {})",
                    job.id,
                    end_time.to_rfc3339()
                );
                self.terminations().schedule_at(job.id, end_time);
                report.armed.push(job.id);
            } else {
                report.unchanged += 1;
            }
        }

        Ok(report)
    }

    async fn stop_overdue(&self, job: &StreamJob, end_time: DateTime<Utc>) {
        info!(
            "Stream '{}' ({}) passed its end time {}, stopping",
            job.title,
            job.id,
            end_time.to_rfc3339()
        );
        self.terminations().cancel(job.id);
        let result = self.supervisor.stop(job.id).await;
        if !result.success {
            warn!(
                "Failed to stop overdue stream {}: {}",
                job.id,
                result.error.unwrap_or_default()
            );
        }
    }
}
