//! Crash retry bookkeeping
//!
//! Each job that crashes is restarted after an exponentially growing delay,
//! up to a fixed number of attempts. A run that keeps sending heartbeats for
//! `reset_interval`, counted from its first heartbeat, earns its counter back.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::SupervisorConfig;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub reset_interval: Duration,
}

impl From<&SupervisorConfig> for RetryPolicy {
    fn from(config: &SupervisorConfig) -> Self {
        Self {
            max_attempts: config.max_retry_attempts,
            base_delay: config.retry_base_delay,
            max_delay: config.retry_max_delay,
            reset_interval: config.retry_reset_interval,
        }
    }
}

impl RetryPolicy {
    /// `min(base * 2^attempt, max)`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct RetryState {
    attempts: u32,
    /// Start of the current sustained-success window, set by the first heartbeat of a run
    last_success: Option<Instant>,
}

/// A scheduled retry: which attempt it is (1-based) and how long to wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub attempt: u32,
    pub delay: Duration,
}

#[derive(Debug)]
pub struct RetryTracker {
    policy: RetryPolicy,
    states: HashMap<Uuid, RetryState>,
}

impl RetryTracker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            states: HashMap::new(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Operator-initiated start: forget earlier failures.
    pub fn reset(&mut self, job_id: Uuid) {
        self.states.insert(job_id, RetryState::default());
    }

    /// A process for the job was spawned. Its success window opens at its first heartbeat.
    pub fn mark_started(&mut self, job_id: Uuid) {
        self.states.entry(job_id).or_default().last_success = None;
    }

    /// The process produced a heartbeat. Returns `true` when success has been
    /// sustained for the reset interval and this forgave earlier failures.
    pub fn record_success(&mut self, job_id: Uuid, now: Instant) -> bool {
        let reset_interval = self.policy.reset_interval;
        let state = self.states.entry(job_id).or_default();
        let since = *state.last_success.get_or_insert(now);
        Self::forgive(state, since, now, reset_interval)
    }

    /// Periodic re-check without a new heartbeat. Jobs that never reported
    /// success are left alone.
    pub fn recheck_sustained(&mut self, job_id: Uuid, now: Instant) -> bool {
        let reset_interval = self.policy.reset_interval;
        match self.states.get_mut(&job_id) {
            Some(state) => match state.last_success {
                Some(since) => Self::forgive(state, since, now, reset_interval),
                None => false,
            },
            None => false,
        }
    }

    fn forgive(state: &mut RetryState, since: Instant, now: Instant, reset_interval: Duration) -> bool {
        if now.saturating_duration_since(since) < reset_interval {
            return false;
        }
        state.last_success = Some(now);
        let forgiven = state.attempts > 0;
        state.attempts = 0;
        forgiven
    }

    /// Register a crash. Returns the retry to schedule, or `None` once attempts are exhausted.
    pub fn next_retry(&mut self, job_id: Uuid) -> Option<RetryDecision> {
        let state = self.states.entry(job_id).or_default();
        if state.attempts >= self.policy.max_attempts {
            return None;
        }

        let delay = self.policy.backoff(state.attempts);
        state.attempts += 1;
        Some(RetryDecision {
            attempt: state.attempts,
            delay,
        })
    }

    pub fn attempts(&self, job_id: Uuid) -> u32 {
        self.states.get(&job_id).map(|s| s.attempts).unwrap_or(0)
    }

    /// Between a crash and the exhaustion of its attempts
    pub fn is_retrying(&self, job_id: Uuid) -> bool {
        let attempts = self.attempts(job_id);
        attempts > 0 && attempts < self.policy.max_attempts
    }

    pub fn clear(&mut self, job_id: Uuid) {
        self.states.remove(&job_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(60),
            reset_interval: Duration::from_secs(30 * 60),
        }
    }

    #[rstest]
    #[case(0, 3)]
    #[case(1, 6)]
    #[case(2, 12)]
    #[case(3, 24)]
    #[case(4, 48)]
    #[case(5, 60)]
    #[case(9, 60)]
    #[case(40, 60)]
    fn backoff_doubles_up_to_cap(#[case] attempt: u32, #[case] expected_secs: u64) {
        assert_eq!(policy().backoff(attempt), Duration::from_secs(expected_secs));
    }

    #[test]
    fn retries_stop_after_max_attempts() {
        let mut tracker = RetryTracker::new(policy());
        let job = Uuid::new_v4();
        tracker.reset(job);

        let delays: Vec<u64> = std::iter::from_fn(|| tracker.next_retry(job))
            .map(|d| d.delay.as_secs())
            .collect();

        assert_eq!(delays, vec![3, 6, 12, 24, 48, 60, 60, 60, 60, 60]);
        assert_eq!(tracker.attempts(job), 10);
        assert!(!tracker.is_retrying(job));
        assert!(tracker.next_retry(job).is_none());
    }

    #[test]
    fn operator_start_resets_attempts() {
        let mut tracker = RetryTracker::new(policy());
        let job = Uuid::new_v4();
        tracker.next_retry(job);
        tracker.next_retry(job);
        assert!(tracker.is_retrying(job));

        tracker.reset(job);

        assert_eq!(tracker.attempts(job), 0);
        assert!(!tracker.is_retrying(job));
    }

    fn crashed_twice(tracker: &mut RetryTracker, job: Uuid) {
        tracker.next_retry(job);
        tracker.next_retry(job);
        tracker.mark_started(job);
    }

    #[test]
    fn sustained_output_forgives_failures() {
        let mut tracker = RetryTracker::new(policy());
        let job = Uuid::new_v4();
        crashed_twice(&mut tracker, job);
        let first = Instant::now();

        assert!(!tracker.record_success(job, first));
        assert!(!tracker.record_success(job, first + Duration::from_secs(60)));
        assert_eq!(tracker.attempts(job), 2);

        assert!(tracker.record_success(job, first + Duration::from_secs(31 * 60)));
        assert_eq!(tracker.attempts(job), 0);
    }

    #[test]
    fn late_first_heartbeat_does_not_forgive() {
        let mut tracker = RetryTracker::new(policy());
        let job = Uuid::new_v4();
        crashed_twice(&mut tracker, job);

        // A run that was silent for an hour only starts its window now
        let spawned_long_ago = Instant::now();
        let first_heartbeat = spawned_long_ago + Duration::from_secs(60 * 60);
        assert!(!tracker.record_success(job, first_heartbeat));
        assert!(!tracker.record_success(job, first_heartbeat + Duration::from_secs(1)));
        assert_eq!(tracker.attempts(job), 2);
    }

    #[test]
    fn exactly_the_reset_interval_forgives() {
        let mut tracker = RetryTracker::new(policy());
        let job = Uuid::new_v4();
        crashed_twice(&mut tracker, job);
        let first = Instant::now();
        tracker.record_success(job, first);

        assert!(tracker.record_success(job, first + policy().reset_interval));
        assert_eq!(tracker.attempts(job), 0);
    }

    #[test]
    fn recheck_leaves_silent_runs_alone() {
        let mut tracker = RetryTracker::new(policy());
        let silent = Uuid::new_v4();
        let chatty = Uuid::new_v4();
        crashed_twice(&mut tracker, silent);
        crashed_twice(&mut tracker, chatty);
        let now = Instant::now();
        tracker.record_success(chatty, now);

        let later = now + Duration::from_secs(2 * 60 * 60);
        assert!(!tracker.recheck_sustained(silent, later));
        assert_eq!(tracker.attempts(silent), 2);
        assert!(tracker.recheck_sustained(chatty, later));
        assert_eq!(tracker.attempts(chatty), 0);
        assert!(!tracker.recheck_sustained(Uuid::new_v4(), later));
    }

    #[test]
    fn new_run_reopens_the_window() {
        let mut tracker = RetryTracker::new(policy());
        let job = Uuid::new_v4();
        crashed_twice(&mut tracker, job);
        let first = Instant::now();
        tracker.record_success(job, first);

        tracker.next_retry(job);
        tracker.mark_started(job);

        let restarted = first + Duration::from_secs(40 * 60);
        assert!(!tracker.record_success(job, restarted));
        assert_eq!(tracker.attempts(job), 3);
    }

    #[test]
    fn short_runs_keep_their_attempts() {
        let mut tracker = RetryTracker::new(policy());
        let job = Uuid::new_v4();
        tracker.next_retry(job);
        tracker.mark_started(job);
        let first = Instant::now();

        assert!(!tracker.record_success(job, first));
        assert!(!tracker.record_success(job, first + Duration::from_secs(10)));
        assert_eq!(tracker.attempts(job), 1);
        assert!(tracker.is_retrying(job));
    }
}
