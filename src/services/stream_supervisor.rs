//! Process supervisor for streaming jobs
//!
//! Owns the process table (at most one process per job), spawns and stops
//! processes, classifies exits and schedules crash retries. Every status
//! transition it performs is written through the job store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::io::AsyncRead;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::retry_tracker::{RetryDecision, RetryPolicy, RetryTracker};
use super::stream_log_buffer::{LogEntry, StreamLogBuffer, StreamLogBufferConfig};
use super::stream_process::{self, ExitKind, ExitOutcome, OutputLines, ProcessMonitor, SpawnedProcess, StreamProcess};
use super::traits::StreamCommandBuilder;
use crate::config::SupervisorConfig;
use crate::errors::{StreamError, StreamResult};
use crate::job_scheduling::termination_scheduler::{
    TerminationHandler, TerminationScheduler, TerminationSchedulerConfig,
};
use crate::models::{
    OperationResult, StatusUpdateOptions, StreamHistoryRecord, StreamStatus,
};
use crate::repositories::{StreamHistorySink, StreamJobStore};
use crate::utils::time::remaining_until;

/// Extra wait after SIGKILL before giving up on an exit report
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Public view of a tracked process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveStreamInfo {
    pub job_id: Uuid,
    pub user_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub pid: Option<u32>,
    pub retry_count: u32,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct TrackedProcess {
    pub job_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub exited: bool,
    /// The exit handler has finished with it
    pub settled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputSource {
    Stdout,
    Stderr,
}

struct ActiveStream {
    process: StreamProcess,
    user_id: Uuid,
}

pub struct StreamSupervisor {
    program: String,
    stop_timeout: Duration,
    heartbeat_marker: String,
    store: Arc<dyn StreamJobStore>,
    history: Arc<dyn StreamHistorySink>,
    command_builder: Arc<dyn StreamCommandBuilder>,
    terminations: Arc<TerminationScheduler>,
    active: RwLock<HashMap<Uuid, ActiveStream>>,
    retries: Mutex<RetryTracker>,
    manual_stops: Mutex<HashSet<Uuid>>,
    logs: StreamLogBuffer,
    shutting_down: AtomicBool,
    me: Weak<Self>,
}

impl StreamSupervisor {
    /// Build the supervisor together with the termination scheduler that calls back into it.
    pub fn new(
        program: impl Into<String>,
        config: &SupervisorConfig,
        termination_config: TerminationSchedulerConfig,
        store: Arc<dyn StreamJobStore>,
        history: Arc<dyn StreamHistorySink>,
        command_builder: Arc<dyn StreamCommandBuilder>,
    ) -> Arc<Self> {
        let program = program.into();
        Arc::new_cyclic(|me: &Weak<Self>| {
            let handler: Weak<dyn TerminationHandler> = me.clone();
            let terminations =
                TerminationScheduler::new(termination_config, store.clone(), handler);
            Self {
                program,
                stop_timeout: config.stop_timeout,
                heartbeat_marker: config.heartbeat_marker.clone(),
                store,
                history,
                command_builder,
                terminations,
                active: RwLock::new(HashMap::new()),
                retries: Mutex::new(RetryTracker::new(RetryPolicy::from(config))),
                manual_stops: Mutex::new(HashSet::new()),
                logs: StreamLogBuffer::new(StreamLogBufferConfig::from(config)),
                shutting_down: AtomicBool::new(false),
                me: me.clone(),
            }
        })
    }

    pub fn terminations(&self) -> &Arc<TerminationScheduler> {
        &self.terminations
    }

    /// Start the job's process. Resets its retry counter.
    pub async fn start(&self, job_id: Uuid) -> OperationResult {
        match self.start_stream(job_id, false).await {
            Ok(pid) => OperationResult::ok(match pid {
                Some(pid) => format!("Stream started successfully (pid: {pid})"),
                None => "Stream started successfully".to_string(),
            }),
            Err(e) => OperationResult::failed(&e),
        }
    }

    /// Stop the job's process, record its history and mark it offline.
    pub async fn stop(&self, job_id: Uuid) -> OperationResult {
        let result = self.stop_stream(job_id).await;
        if let Err(e) = &result {
            warn!("stream_id={} status=stop_failed error={}", job_id, e);
        }
        result.into()
    }

    /// True while a process for the job is tracked and has not exited.
    pub async fn is_active(&self, job_id: Uuid) -> bool {
        // Read only: exited entries are removed by the exit handler or the reaper
        self.active
            .read()
            .await
            .get(&job_id)
            .is_some_and(|entry| !entry.process.has_exited())
    }

    pub async fn list_active(&self) -> Vec<Uuid> {
        self.active
            .read()
            .await
            .iter()
            .filter(|(_, entry)| !entry.process.has_exited())
            .map(|(job_id, _)| *job_id)
            .collect()
    }

    pub async fn get_active_info(&self, job_id: Uuid) -> Option<ActiveStreamInfo> {
        let (user_id, started_at, pid) = {
            let active = self.active.read().await;
            let entry = active.get(&job_id).filter(|e| !e.process.has_exited())?;
            (entry.user_id, entry.process.started_at(), entry.process.pid())
        };
        let retry_count = self.retries.lock().await.attempts(job_id);
        Some(ActiveStreamInfo {
            job_id,
            user_id,
            started_at,
            pid,
            retry_count,
        })
    }

    pub async fn get_logs(&self, job_id: Uuid) -> Vec<LogEntry> {
        self.logs.entries(job_id).await
    }

    pub async fn is_retrying(&self, job_id: Uuid) -> bool {
        self.retries.lock().await.is_retrying(job_id)
    }

    async fn start_stream(&self, job_id: Uuid, is_retry: bool) -> StreamResult<Option<u32>> {
        if !is_retry {
            self.retries.lock().await.reset(job_id);
        }
        if self.is_active(job_id).await {
            return Err(StreamError::AlreadyActive(job_id));
        }

        let result = self.launch(job_id).await;
        match &result {
            Ok(pid) => info!("stream_id={} status=started pid={:?}", job_id, pid),
            Err(StreamError::AlreadyActive(_)) => {}
            Err(e) => {
                error!("stream_id={} status=start_failed error={}", job_id, e);
                self.logs
                    .append(job_id, format!("Failed to start stream: {e}"))
                    .await;
            }
        }
        result
    }

    async fn launch(&self, job_id: Uuid) -> StreamResult<Option<u32>> {
        let with_source = self
            .store
            .get_with_source(job_id)
            .await?
            .ok_or_else(|| StreamError::job_not_found(job_id))?;
        let command = self.command_builder.build(&with_source).await?;
        let job = with_source.job;

        // The lookups above yield; someone may have started the job meanwhile
        if self.is_active(job_id).await {
            return Err(StreamError::AlreadyActive(job_id));
        }

        self.logs
            .append(
                job_id,
                format!("Starting stream: {} {}", self.program, command.args.join(" ")),
            )
            .await;
        debug!("Streaming {} to {}", job_id, command.destination);

        let SpawnedProcess {
            process,
            monitor,
            stdout,
            stderr,
        } = stream_process::spawn(&self.program, &command.args)?;
        let pid = process.pid();
        let run_id = process.run_id();

        let busy = {
            let mut active = self.active.write().await;
            let busy = active
                .get(&job_id)
                .is_some_and(|entry| !entry.process.has_exited());
            if !busy {
                active.insert(
                    job_id,
                    ActiveStream {
                        process: process.clone(),
                        user_id: job.user_id,
                    },
                );
            }
            busy
        };
        if busy {
            // Dropping the monitor kills the child as well
            let _ = process.kill();
            return Err(StreamError::AlreadyActive(job_id));
        }

        self.retries.lock().await.mark_started(job_id);

        if let Err(e) = self
            .store
            .update_status(
                job_id,
                StreamStatus::Live,
                Some(job.user_id),
                StatusUpdateOptions::started_at(process.started_at()),
            )
            .await
        {
            warn!("stream_id={} status=live_write_failed error={}", job_id, e);
            self.logs
                .append(job_id, format!("Failed to record live status: {e}"))
                .await;
        }

        self.attach_output(job_id, stdout, OutputSource::Stdout);
        self.attach_output(job_id, stderr, OutputSource::Stderr);
        self.attach_monitor(job_id, run_id, monitor);

        if let Some(end_time) = job.end_time {
            match remaining_until(end_time, Utc::now()) {
                Some(remaining) => {
                    self.terminations.schedule(job_id, remaining);
                }
                None => warn!(
                    "Stream {} started after its end time {}; the next sweep will stop it",
                    job_id,
                    end_time.to_rfc3339()
                ),
            }
        }

        Ok(pid)
    }

    fn attach_output<R>(&self, job_id: Uuid, reader: Option<R>, source: OutputSource)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (Some(reader), Some(supervisor)) = (reader, self.me.upgrade()) else {
            return;
        };
        tokio::spawn(async move {
            let mut lines = OutputLines::new(reader);
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => supervisor.record_output(job_id, source, line).await,
                    Ok(None) => break,
                    Err(e) => {
                        debug!("Output reader for stream {} ended: {}", job_id, e);
                        break;
                    }
                }
            }
        });
    }

    fn attach_monitor(&self, job_id: Uuid, run_id: Uuid, mut monitor: ProcessMonitor) {
        let Some(supervisor) = self.me.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            let outcome = monitor.wait().await;
            supervisor.handle_exit(job_id, run_id, outcome).await;
            monitor.settle(outcome);
        });
    }

    async fn record_output(&self, job_id: Uuid, source: OutputSource, line: String) {
        let healthy = match source {
            OutputSource::Stdout => {
                self.logs.append(job_id, format!("[OUTPUT] {line}")).await;
                true
            }
            OutputSource::Stderr => {
                let heartbeat = line.contains(&self.heartbeat_marker);
                if !heartbeat {
                    warn!("[FFmpeg] stream_id={} {}", job_id, line);
                }
                self.logs.append(job_id, format!("[FFmpeg] {line}")).await;
                heartbeat
            }
        };

        if healthy && self.retries.lock().await.record_success(job_id, Instant::now()) {
            info!(
                "Stream {} has been healthy for a while, retry counter reset",
                job_id
            );
        }
    }

    async fn handle_exit(&self, job_id: Uuid, run_id: Uuid, outcome: ExitOutcome) {
        self.logs
            .append(
                job_id,
                format!(
                    "Stream ended with code {}, signal: {}",
                    outcome.code.map_or("none".to_string(), |c| c.to_string()),
                    outcome.signal.map_or("none".to_string(), |s| s.to_string())
                ),
            )
            .await;

        let (was_active, superseded) = {
            let mut active = self.active.write().await;
            let current = active.get(&job_id).map(|entry| entry.process.run_id());
            match current {
                Some(current) if current == run_id => {
                    active.remove(&job_id);
                    (true, false)
                }
                Some(_) => (false, true),
                None => (false, false),
            }
        };
        if superseded {
            debug!("Ignoring exit of a replaced process for stream {}", job_id);
            return;
        }

        if self.manual_stops.lock().await.remove(&job_id) {
            info!("stream_id={} status=stopped reason=manual", job_id);
            if was_active {
                self.mark_offline(job_id).await;
            }
            self.terminations.cancel(job_id);
            self.retries.lock().await.clear(job_id);
            return;
        }

        let exit = outcome.to_error();
        match outcome.kind() {
            ExitKind::Crash => {
                let decision = self.retries.lock().await.next_retry(job_id);
                match decision {
                    Some(RetryDecision { attempt, delay }) if !self.is_shutting_down() => {
                        let max = self.retries.lock().await.policy().max_attempts;
                        warn!(
                            "stream_id={} status=crashed attempt={}/{} retry_in={} error={}",
                            job_id,
                            attempt,
                            max,
                            humantime::format_duration(delay),
                            exit
                        );
                        self.logs
                            .append(
                                job_id,
                                format!(
                                    "Stream crashed, retrying in {} (attempt {attempt}/{max})",
                                    humantime::format_duration(delay)
                                ),
                            )
                            .await;
                        self.schedule_retry(job_id, delay);
                        return;
                    }
                    Some(_) => {}
                    None => {
                        error!(
                            "stream_id={} status=retries_exhausted error={}",
                            job_id, exit
                        );
                        self.logs
                            .append(job_id, "Maximum retry attempts reached, stream marked offline")
                            .await;
                    }
                }
            }
            ExitKind::Clean => {
                info!("stream_id={} status=exited {}", job_id, exit);
            }
        }

        if was_active {
            self.mark_offline(job_id).await;
        }
        self.terminations.cancel(job_id);
        self.retries.lock().await.clear(job_id);
    }

    fn schedule_retry(&self, job_id: Uuid, delay: Duration) {
        let Some(supervisor) = self.me.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            supervisor.retry(job_id).await;
        });
    }

    async fn retry(&self, job_id: Uuid) {
        if self.is_shutting_down() {
            return;
        }

        match self.store.find_by_id(job_id).await {
            Ok(Some(job)) if job.status != StreamStatus::Offline => {}
            Ok(_) => {
                info!(
                    "Stream {} was stopped while waiting to retry; not restarting",
                    job_id
                );
                self.retries.lock().await.clear(job_id);
                return;
            }
            Err(e) => {
                error!("Cannot read stream {} before retry: {}", job_id, e);
                self.mark_offline(job_id).await;
                self.retries.lock().await.clear(job_id);
                return;
            }
        }

        let attempt = self.retries.lock().await.attempts(job_id);
        info!("Retrying stream {} (attempt {})", job_id, attempt);
        match self.start_stream(job_id, true).await {
            Ok(_) | Err(StreamError::AlreadyActive(_)) => {}
            Err(_) => {
                self.mark_offline(job_id).await;
                self.retries.lock().await.clear(job_id);
            }
        }
    }

    async fn stop_stream(&self, job_id: Uuid) -> StreamResult<String> {
        let process = self
            .active
            .read()
            .await
            .get(&job_id)
            .map(|entry| entry.process.clone());
        let Some(process) = process else {
            return self.stop_untracked(job_id).await;
        };

        info!("Stopping stream {} (pid: {:?})", job_id, process.pid());
        self.logs.append(job_id, "Stopping stream...").await;
        self.manual_stops.lock().await.insert(job_id);

        if let Err(e) = process.terminate() {
            warn!("Failed to send SIGTERM to stream {}: {}", job_id, e);
        }
        if !process.wait_settled(self.stop_timeout).await {
            warn!(
                "Stream {} did not exit within {}, sending SIGKILL",
                job_id,
                humantime::format_duration(self.stop_timeout)
            );
            if let Err(e) = process.kill() {
                error!("Failed to kill stream {}: {}", job_id, e);
            }
            if !process.wait_settled(KILL_GRACE).await {
                warn!("Stream {} has not reported its exit after SIGKILL", job_id);
            }
        }

        {
            let mut active = self.active.write().await;
            let same_run = active
                .get(&job_id)
                .is_some_and(|entry| entry.process.run_id() == process.run_id());
            if same_run {
                active.remove(&job_id);
            }
        }
        self.manual_stops.lock().await.remove(&job_id);

        self.remove_artifacts(job_id).await;
        let finished = self.finish_run(job_id).await;
        self.terminations.cancel(job_id);
        self.retries.lock().await.clear(job_id);
        finished?;

        Ok("Stream stopped successfully".to_string())
    }

    /// Stop requested for a job with no tracked process
    async fn stop_untracked(&self, job_id: Uuid) -> StreamResult<String> {
        match self.store.find_by_id(job_id).await? {
            Some(job) if job.is_live() => {
                self.store
                    .update_status(
                        job_id,
                        StreamStatus::Offline,
                        Some(job.user_id),
                        StatusUpdateOptions::default(),
                    )
                    .await?;
                self.terminations.cancel(job_id);
                self.retries.lock().await.clear(job_id);
                self.logs
                    .append(job_id, "Stream was not running; status corrected to offline")
                    .await;
                info!("Stream {} was marked live without a process; set offline", job_id);
                Ok("Stream was not active; status corrected to offline".to_string())
            }
            _ => Err(StreamError::NotActive(job_id)),
        }
    }

    /// Write the history record and the offline status for a stopped run
    async fn finish_run(&self, job_id: Uuid) -> StreamResult<()> {
        let ended_at = Utc::now();
        let Some(with_source) = self.store.get_with_source(job_id).await? else {
            return Ok(());
        };
        let source_title = with_source.source.as_ref().map(|s| s.title().to_string());
        let job = with_source.job;

        if let Some(record) = StreamHistoryRecord::from_run(&job, source_title, ended_at) {
            let duration = record.duration_seconds;
            match self.history.record(record).await {
                Ok(()) => debug!("Recorded {}s of history for stream {}", duration, job_id),
                Err(e) => warn!("Failed to save history for stream {}: {}", job_id, e),
            }
        }

        self.store
            .update_status(
                job_id,
                StreamStatus::Offline,
                Some(job.user_id),
                StatusUpdateOptions::default(),
            )
            .await?;
        Ok(())
    }

    async fn remove_artifacts(&self, job_id: Uuid) {
        for path in self.command_builder.artifacts(job_id) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }

    pub(crate) async fn mark_offline(&self, job_id: Uuid) {
        if let Err(e) = self
            .store
            .update_status(
                job_id,
                StreamStatus::Offline,
                None,
                StatusUpdateOptions::default(),
            )
            .await
        {
            error!("stream_id={} status=offline_write_failed error={}", job_id, e);
        }
    }

    /// Forget retry state and any armed termination for a job that is no longer running.
    pub(crate) async fn clear_bookkeeping(&self, job_id: Uuid) {
        self.retries.lock().await.clear(job_id);
        self.terminations.cancel(job_id);
    }

    /// Snapshot of the process table, exited entries included
    pub(crate) async fn tracked_processes(&self) -> Vec<TrackedProcess> {
        self.active
            .read()
            .await
            .iter()
            .map(|(job_id, entry)| TrackedProcess {
                job_id: *job_id,
                started_at: entry.process.started_at(),
                exited: entry.process.has_exited(),
                settled: entry.process.is_settled(),
            })
            .collect()
    }

    /// Drop the table entry of a process whose exit was handled but left behind.
    /// Returns whether one was removed.
    pub(crate) async fn reap_exited(&self, job_id: Uuid) -> bool {
        let mut active = self.active.write().await;
        // An exited but unsettled process is still in the hands of its exit handler
        let stale = active
            .get(&job_id)
            .is_some_and(|entry| entry.process.is_settled());
        if stale {
            active.remove(&job_id);
        }
        stale
    }

    /// Terminate a tracked process whose job no longer exists.
    pub(crate) async fn terminate_orphan(&self, job_id: Uuid) -> StreamResult<Option<u32>> {
        let Some(entry) = self.active.write().await.remove(&job_id) else {
            return Ok(None);
        };
        self.manual_stops.lock().await.insert(job_id);
        self.clear_bookkeeping(job_id).await;
        entry.process.terminate()?;
        Ok(entry.process.pid())
    }

    /// Give back retry budget to running jobs whose heartbeats have been sustained long enough.
    pub(crate) async fn forgive_sustained_runs(&self) -> usize {
        let running = self.list_active().await;
        let now = Instant::now();
        let mut retries = self.retries.lock().await;
        running
            .into_iter()
            .filter(|job_id| retries.recheck_sustained(*job_id, now))
            .count()
    }

    pub async fn cleanup_stale_logs(&self) -> usize {
        let active: HashSet<Uuid> = self.list_active().await.into_iter().collect();
        self.logs.cleanup_stale(&active, Utc::now()).await
    }

    fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Stop every tracked process, mark the jobs offline and drop all timers.
    ///
    /// Log buffers are kept. All processes share one `stop_timeout` before SIGKILL.
    pub async fn shutdown(&self) -> usize {
        self.shutting_down.store(true, Ordering::SeqCst);
        let entries: Vec<(Uuid, ActiveStream)> = self.active.write().await.drain().collect();
        info!("Shutting down {} active streams", entries.len());

        for (job_id, entry) in &entries {
            self.manual_stops.lock().await.insert(*job_id);
            if let Err(e) = entry.process.terminate() {
                error!("Failed to stop stream {} during shutdown: {}", job_id, e);
            }
            self.mark_offline(*job_id).await;
            self.retries.lock().await.clear(*job_id);
        }
        self.terminations.cancel_all();

        // One stop timeout for the whole table, not per stream
        let deadline = tokio::time::Instant::now() + self.stop_timeout;
        let mut killed = Vec::new();
        for (job_id, entry) in &entries {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if !entry.process.wait_settled(remaining).await {
                warn!("Stream {} ignored SIGTERM during shutdown, killing", job_id);
                if let Err(e) = entry.process.kill() {
                    error!("Failed to kill stream {}: {}", job_id, e);
                }
                killed.push(&entry.process);
            }
        }

        let grace = tokio::time::Instant::now() + KILL_GRACE;
        for process in killed {
            let remaining = grace.saturating_duration_since(tokio::time::Instant::now());
            process.wait_settled(remaining).await;
        }

        entries.len()
    }
}

#[async_trait]
impl TerminationHandler for StreamSupervisor {
    async fn terminate(&self, job_id: Uuid) -> OperationResult {
        self.stop(job_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CommandBuildError;
    use crate::models::{StreamJob, StreamJobWithSource};
    use crate::repositories::InMemoryStreamStore;
    use crate::services::traits::StreamCommand;
    use tracing_test::traced_test;

    struct NoCommand;

    #[async_trait]
    impl StreamCommandBuilder for NoCommand {
        async fn build(
            &self,
            job: &StreamJobWithSource,
        ) -> Result<StreamCommand, CommandBuildError> {
            Err(CommandBuildError::SourceMissing {
                job_id: job.job.id,
                detail: "no media".to_string(),
            })
        }
    }

    fn supervisor(config: &SupervisorConfig) -> (Arc<StreamSupervisor>, Arc<InMemoryStreamStore>) {
        let store = Arc::new(InMemoryStreamStore::new());
        let supervisor = StreamSupervisor::new(
            "ffmpeg",
            config,
            TerminationSchedulerConfig {
                recheck_interval: Duration::from_secs(300),
                max_timer_delay: Duration::from_millis(2_147_483_647),
            },
            store.clone(),
            store.clone(),
            Arc::new(NoCommand),
        );
        (supervisor, store)
    }

    #[traced_test]
    #[tokio::test]
    async fn stderr_noise_is_logged_and_heartbeats_are_not() {
        let (supervisor, _) = supervisor(&SupervisorConfig::default());
        let job_id = Uuid::new_v4();

        supervisor
            .record_output(job_id, OutputSource::Stderr, "frame=  120 fps= 30".to_string())
            .await;
        supervisor
            .record_output(job_id, OutputSource::Stderr, "Connection refused".to_string())
            .await;
        supervisor
            .record_output(job_id, OutputSource::Stdout, "hello".to_string())
            .await;

        let lines: Vec<String> = supervisor
            .get_logs(job_id)
            .await
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(
            lines,
            vec![
                "[FFmpeg] frame=  120 fps= 30",
                "[FFmpeg] Connection refused",
                "[OUTPUT] hello",
            ]
        );
        assert!(logs_contain("Connection refused"));
        assert!(!logs_contain("fps= 30"));
    }

    #[tokio::test]
    async fn heartbeat_after_a_sustained_run_forgives_failures() {
        let config = SupervisorConfig {
            retry_reset_interval: Duration::from_millis(20),
            ..SupervisorConfig::default()
        };
        let (supervisor, _) = supervisor(&config);
        let job_id = Uuid::new_v4();
        {
            let mut retries = supervisor.retries.lock().await;
            retries.next_retry(job_id);
            retries.mark_started(job_id);
        }
        assert!(supervisor.is_retrying(job_id).await);

        // Silence before the first heartbeat does not count
        tokio::time::sleep(Duration::from_millis(40)).await;
        supervisor
            .record_output(job_id, OutputSource::Stderr, "frame=1".to_string())
            .await;
        assert_eq!(supervisor.retries.lock().await.attempts(job_id), 1);

        tokio::time::sleep(Duration::from_millis(40)).await;
        supervisor
            .record_output(job_id, OutputSource::Stderr, "frame=2".to_string())
            .await;

        assert_eq!(supervisor.retries.lock().await.attempts(job_id), 0);
    }

    #[tokio::test]
    async fn start_failure_leaves_job_untouched() {
        let (supervisor, store) = supervisor(&SupervisorConfig::default());
        let job = StreamJob::new(Uuid::new_v4(), "t", "rtmp://host/app", "key");
        store.insert_job(job.clone()).await;

        let result = supervisor.start(job.id).await;

        assert!(!result.success);
        assert!(!supervisor.is_active(job.id).await);
        assert_eq!(
            store.find_by_id(job.id).await.unwrap().unwrap().status,
            StreamStatus::Scheduled
        );
        assert!(supervisor.terminations().get(job.id).is_none());
    }

    async fn track(supervisor: &StreamSupervisor, job_id: Uuid, script: &str) -> ProcessMonitor {
        let spawned = stream_process::spawn("sh", &["-c".to_string(), script.to_string()]).unwrap();
        supervisor.active.write().await.insert(
            job_id,
            ActiveStream {
                process: spawned.process,
                user_id: Uuid::new_v4(),
            },
        );
        spawned.monitor
    }

    #[tokio::test]
    async fn reaper_waits_for_the_exit_handler() {
        let (supervisor, _) = supervisor(&SupervisorConfig::default());
        let job_id = Uuid::new_v4();
        let mut monitor = track(&supervisor, job_id, "exit 3").await;

        let outcome = monitor.wait().await;
        assert!(!supervisor.is_active(job_id).await);
        assert!(!supervisor.reap_exited(job_id).await);
        assert_eq!(supervisor.tracked_processes().await.len(), 1);

        monitor.settle(outcome);
        assert!(supervisor.reap_exited(job_id).await);
        assert!(supervisor.tracked_processes().await.is_empty());
    }

    #[tokio::test]
    async fn health_sweep_skips_runs_without_heartbeats() {
        let config = SupervisorConfig {
            retry_reset_interval: Duration::from_millis(20),
            ..SupervisorConfig::default()
        };
        let (supervisor, _) = supervisor(&config);
        let silent = Uuid::new_v4();
        let chatty = Uuid::new_v4();
        let _silent_monitor = track(&supervisor, silent, "exec sleep 30").await;
        let _chatty_monitor = track(&supervisor, chatty, "exec sleep 30").await;
        {
            let mut retries = supervisor.retries.lock().await;
            for job_id in [silent, chatty] {
                retries.next_retry(job_id);
                retries.mark_started(job_id);
            }
        }
        supervisor
            .record_output(chatty, OutputSource::Stderr, "frame=1".to_string())
            .await;

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(supervisor.forgive_sustained_runs().await, 1);
        let retries = supervisor.retries.lock().await;
        assert_eq!(retries.attempts(silent), 1);
        assert_eq!(retries.attempts(chatty), 0);
    }

    #[tokio::test]
    async fn shutdown_with_nothing_running_is_a_no_op() {
        let (supervisor, _) = supervisor(&SupervisorConfig::default());
        assert_eq!(supervisor.shutdown().await, 0);
        assert!(supervisor.list_active().await.is_empty());
    }
}
