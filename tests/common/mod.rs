//! Shared fixtures for the lifecycle integration tests
//!
//! Streams are played by `sh -c <script>` so the tests exercise real child
//! processes, signals and exit codes without needing ffmpeg.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use stream_conductor::config::Config;
use stream_conductor::errors::CommandBuildError;
use stream_conductor::models::{StatusUpdateOptions, StreamJob, StreamJobWithSource, StreamStatus};
use stream_conductor::repositories::{InMemoryStreamStore, StreamJobStore};
use stream_conductor::services::{StreamCommand, StreamCommandBuilder, StreamLifecycleManager};

/// Runs until signalled
pub const LONG_RUNNING: &str = "echo started; exec sleep 30";
pub const CRASHING: &str = "echo 'boom' 1>&2; exit 3";
pub const CLEAN_EXIT: &str = "exit 0";
/// Only SIGKILL brings it down
pub const IGNORES_SIGTERM: &str = "trap '' TERM; echo started; while true; do sleep 0.2; done";

/// Command builder that hands each job a shell script
#[derive(Default)]
pub struct ScriptCommandBuilder {
    scripts: Mutex<HashMap<Uuid, String>>,
}

impl ScriptCommandBuilder {
    pub fn set_script(&self, job_id: Uuid, script: &str) {
        self.scripts
            .lock()
            .unwrap()
            .insert(job_id, script.to_string());
    }
}

#[async_trait]
impl StreamCommandBuilder for ScriptCommandBuilder {
    async fn build(&self, job: &StreamJobWithSource) -> Result<StreamCommand, CommandBuildError> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&job.job.id)
            .cloned()
            .ok_or_else(|| CommandBuildError::SourceMissing {
                job_id: job.job.id,
                detail: "no script registered".to_string(),
            })?;
        Ok(StreamCommand {
            args: vec!["-c".to_string(), script],
            destination: job.job.destination(),
        })
    }
}

pub struct Harness {
    pub store: Arc<InMemoryStreamStore>,
    pub builder: Arc<ScriptCommandBuilder>,
    pub manager: StreamLifecycleManager,
}

/// Small delays so retry and stop paths finish quickly
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.ffmpeg.command = "sh".to_string();
    config.supervisor.max_retry_attempts = 2;
    config.supervisor.retry_base_delay = Duration::from_millis(50);
    config.supervisor.retry_max_delay = Duration::from_millis(200);
    config.supervisor.stop_timeout = Duration::from_secs(5);
    config
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(InMemoryStreamStore::new());
        let builder = Arc::new(ScriptCommandBuilder::default());
        let manager = StreamLifecycleManager::new(&config, store.clone(), store.clone(), builder.clone());
        Self {
            store,
            builder,
            manager,
        }
    }

    /// Insert a scheduled job that runs `script` when started.
    pub async fn add_job(&self, script: &str, schedule_time: Option<DateTime<Utc>>) -> StreamJob {
        let mut job = StreamJob::new(Uuid::new_v4(), "Test stream", "rtmp://localhost/live/", "key");
        job.schedule_time = schedule_time;
        self.builder.set_script(job.id, script);
        self.store.insert_job(job.clone()).await;
        job
    }

    /// Insert a job already marked live, without a process behind it.
    pub async fn add_live_job(&self, started_at: DateTime<Utc>) -> StreamJob {
        let job = self.add_job(LONG_RUNNING, None).await;
        self.store
            .update_status(job.id, StreamStatus::Live, None, StatusUpdateOptions::started_at(started_at))
            .await
            .unwrap();
        self.job(job.id).await
    }

    pub async fn job(&self, job_id: Uuid) -> StreamJob {
        self.store.find_by_id(job_id).await.unwrap().unwrap()
    }

    pub async fn status(&self, job_id: Uuid) -> StreamStatus {
        self.job(job_id).await.status
    }

    pub async fn log_lines(&self, job_id: Uuid) -> Vec<String> {
        self.manager
            .get_logs(job_id)
            .await
            .into_iter()
            .map(|entry| entry.message)
            .collect()
    }

    pub async fn count_logs(&self, job_id: Uuid, needle: &str) -> usize {
        self.log_lines(job_id)
            .await
            .iter()
            .filter(|line| line.contains(needle))
            .count()
    }
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn wait_for<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
