//! Timers that stop streams at their end time
//!
//! At most one timer exists per job. Delays longer than the largest delay a
//! single timer is trusted with are handled by a periodic recheck that
//! re-reads the job and re-arms itself until the remaining time fits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::errors::{StreamError, StreamResult};
use crate::models::OperationResult;
use crate::repositories::StreamJobStore;
use crate::utils::time::{add_duration, remaining_until};

/// Receiver of termination requests; implemented by the process supervisor
#[async_trait]
pub trait TerminationHandler: Send + Sync {
    async fn terminate(&self, job_id: Uuid) -> OperationResult;
}

#[derive(Debug, Clone)]
pub struct TerminationSchedulerConfig {
    /// Interval between rechecks of long-duration jobs
    pub recheck_interval: Duration,
    /// Largest delay handed to a single timer
    pub max_timer_delay: Duration,
}

impl From<&SchedulerConfig> for TerminationSchedulerConfig {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            recheck_interval: config.long_duration_check_interval,
            max_timer_delay: config.max_timer_delay,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationTimer {
    /// Fires once at the deadline and stops the stream
    Direct { deadline: DateTime<Utc> },
    /// Fires every `interval` to re-read the job until `target` is close enough
    PeriodicRecheck {
        interval: Duration,
        target: DateTime<Utc>,
    },
}

impl TerminationTimer {
    pub fn target(&self) -> DateTime<Utc> {
        match self {
            Self::Direct { deadline } => *deadline,
            Self::PeriodicRecheck { target, .. } => *target,
        }
    }

    pub fn is_long_duration(&self) -> bool {
        matches!(self, Self::PeriodicRecheck { .. })
    }
}

/// Query view of an armed timer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTermination {
    pub target_end_time: DateTime<Utc>,
    pub is_long_duration: bool,
    pub remaining: Duration,
}

struct ArmedTimer {
    timer: TerminationTimer,
    generation: u64,
    handle: JoinHandle<()>,
}

pub struct TerminationScheduler {
    config: TerminationSchedulerConfig,
    store: Arc<dyn StreamJobStore>,
    handler: Weak<dyn TerminationHandler>,
    timers: Mutex<HashMap<Uuid, ArmedTimer>>,
    next_generation: AtomicU64,
    me: Weak<Self>,
}

impl TerminationScheduler {
    pub fn new(
        config: TerminationSchedulerConfig,
        store: Arc<dyn StreamJobStore>,
        handler: Weak<dyn TerminationHandler>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            config,
            store,
            handler,
            timers: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            me: me.clone(),
        })
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<Uuid, ArmedTimer>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm (or re-arm) the timer for `job_id` to stop it after `remaining`.
    pub fn schedule(&self, job_id: Uuid, remaining: Duration) -> ScheduledTermination {
        let target = add_duration(Utc::now(), remaining);
        self.arm(job_id, target, remaining)
    }

    /// Minute-based entry point. Non-finite values are rejected, negative ones clamp to zero.
    pub fn schedule_minutes(
        &self,
        job_id: Uuid,
        minutes: f64,
    ) -> StreamResult<ScheduledTermination> {
        if !minutes.is_finite() {
            return Err(StreamError::InvalidDuration(minutes));
        }
        let remaining = Duration::try_from_secs_f64(minutes.max(0.0) * 60.0)
            .map_err(|_| StreamError::InvalidDuration(minutes))?;
        Ok(self.schedule(job_id, remaining))
    }

    /// Arm the timer for an absolute end time (past times fire immediately).
    pub fn schedule_at(&self, job_id: Uuid, end_time: DateTime<Utc>) -> ScheduledTermination {
        let remaining = remaining_until(end_time, Utc::now()).unwrap_or_default();
        self.arm(job_id, end_time, remaining)
    }

    fn arm(
        &self,
        job_id: Uuid,
        target: DateTime<Utc>,
        remaining: Duration,
    ) -> ScheduledTermination {
        let is_long_duration = remaining > self.config.max_timer_delay;
        let (timer, delay) = if is_long_duration {
            let interval = self.config.recheck_interval.min(self.config.max_timer_delay);
            (TerminationTimer::PeriodicRecheck { interval, target }, interval)
        } else {
            (TerminationTimer::Direct { deadline: target }, remaining)
        };

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let me = self.me.clone();
        let mut timers = self.timers();
        if let Some(previous) = timers.remove(&job_id) {
            previous.handle.abort();
        }
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(scheduler) = me.upgrade() {
                scheduler.fire(job_id, generation).await;
            }
        });
        timers.insert(
            job_id,
            ArmedTimer {
                timer,
                generation,
                handle,
            },
        );
        drop(timers);

        if is_long_duration {
            info!(
                "Scheduled long-duration termination for stream {} at {} (recheck every {})",
                job_id,
                target.to_rfc3339(),
                humantime::format_duration(delay)
            );
        } else {
            info!(
                "Scheduled termination for stream {} in {}",
                job_id,
                humantime::format_duration(remaining)
            );
        }

        ScheduledTermination {
            target_end_time: target,
            is_long_duration,
            remaining,
        }
    }

    /// Disarm the timer for `job_id`. Returns whether one existed.
    pub fn cancel(&self, job_id: Uuid) -> bool {
        let removed = self.timers().remove(&job_id);
        match removed {
            Some(armed) => {
                armed.handle.abort();
                debug!("Cancelled scheduled termination for stream {}", job_id);
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) -> usize {
        let mut timers = self.timers();
        let count = timers.len();
        for (_, armed) in timers.drain() {
            armed.handle.abort();
        }
        if count > 0 {
            info!("Cancelled {} scheduled terminations", count);
        }
        count
    }

    pub fn get(&self, job_id: Uuid) -> Option<ScheduledTermination> {
        let timers = self.timers();
        let armed = timers.get(&job_id)?;
        let target = armed.timer.target();
        Some(ScheduledTermination {
            target_end_time: target,
            is_long_duration: armed.timer.is_long_duration(),
            remaining: remaining_until(target, Utc::now()).unwrap_or_default(),
        })
    }

    pub fn timer(&self, job_id: Uuid) -> Option<TerminationTimer> {
        self.timers().get(&job_id).map(|armed| armed.timer)
    }

    pub fn scheduled_jobs(&self) -> Vec<Uuid> {
        self.timers().keys().copied().collect()
    }

    async fn fire(&self, job_id: Uuid, generation: u64) {
        // Claim the entry first so a cancel issued by the stop below cannot abort this task
        let timer = {
            let mut timers = self.timers();
            let current = timers
                .get(&job_id)
                .is_some_and(|armed| armed.generation == generation);
            if current {
                timers.remove(&job_id).map(|armed| armed.timer)
            } else {
                None
            }
        };

        match timer {
            Some(TerminationTimer::Direct { .. }) => self.terminate_if_live(job_id).await,
            Some(TerminationTimer::PeriodicRecheck { target, .. }) => {
                self.recheck(job_id, target).await
            }
            None => {}
        }
    }

    async fn terminate_if_live(&self, job_id: Uuid) {
        match self.store.find_by_id(job_id).await {
            Ok(Some(job)) if job.is_live() => {}
            Ok(Some(job)) => {
                debug!(
                    "Stream {} reached its end time but is {}; nothing to stop",
                    job_id, job.status
                );
                return;
            }
            Ok(None) => {
                debug!("Stream {} no longer exists; dropping termination", job_id);
                return;
            }
            Err(e) => {
                warn!(
                    "Could not read stream {} before termination, stopping anyway: {}",
                    job_id, e
                );
            }
        }

        let Some(handler) = self.handler.upgrade() else {
            warn!("Termination handler is gone; cannot stop stream {}", job_id);
            return;
        };

        info!("Stream {} reached its scheduled end time, stopping", job_id);
        let result = handler.terminate(job_id).await;
        if !result.success {
            warn!(
                "Scheduled termination of stream {} failed: {}",
                job_id,
                result.error.unwrap_or_default()
            );
        }
    }

    async fn recheck(&self, job_id: Uuid, previous_target: DateTime<Utc>) {
        let job = match self.store.find_by_id(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                debug!("Stream {} no longer exists; dropping termination recheck", job_id);
                return;
            }
            Err(e) => {
                error!(
                    "Termination recheck for stream {} failed, keeping previous target: {}",
                    job_id, e
                );
                self.schedule_at(job_id, previous_target);
                return;
            }
        };

        if !job.is_live() {
            debug!("Stream {} is {}; dropping termination recheck", job_id, job.status);
            return;
        }

        match job.end_time {
            Some(end_time) => match remaining_until(end_time, Utc::now()) {
                Some(remaining) => {
                    debug!(
                        "Stream {} has {} left, re-arming termination",
                        job_id,
                        humantime::format_duration(remaining)
                    );
                    self.arm(job_id, end_time, remaining);
                }
                None => self.terminate_if_live(job_id).await,
            },
            None => info!(
                "Stream {} no longer has an end time; dropping termination recheck",
                job_id
            ),
        }
    }
}
