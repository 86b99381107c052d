//! Per-job log ring buffer
//!
//! Keeps the most recent diagnostic lines for each job so operators can see
//! why a stream failed without digging through the process log. Buffers
//! outlive the process that wrote them; a periodic sweep drops buffers of
//! jobs that have been inactive for longer than the retention window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::config::SupervisorConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct StreamLogBufferConfig {
    /// Entries kept per job; the oldest is evicted first
    pub capacity: usize,
    /// How long an inactive job's buffer survives after its newest entry
    pub retention: Duration,
}

impl From<&SupervisorConfig> for StreamLogBufferConfig {
    fn from(config: &SupervisorConfig) -> Self {
        Self {
            capacity: config.log_buffer_capacity.max(1),
            retention: config.log_retention,
        }
    }
}

pub struct StreamLogBuffer {
    config: StreamLogBufferConfig,
    logs: RwLock<HashMap<Uuid, VecDeque<LogEntry>>>,
}

impl StreamLogBuffer {
    pub fn new(config: StreamLogBufferConfig) -> Self {
        Self {
            config,
            logs: RwLock::new(HashMap::new()),
        }
    }

    pub async fn append(&self, job_id: Uuid, message: impl Into<String>) {
        self.append_at(job_id, message, Utc::now()).await;
    }

    pub async fn append_at(&self, job_id: Uuid, message: impl Into<String>, timestamp: DateTime<Utc>) {
        let mut logs = self.logs.write().await;
        let buffer = logs
            .entry(job_id)
            .or_insert_with(|| VecDeque::with_capacity(self.config.capacity));
        while buffer.len() >= self.config.capacity {
            buffer.pop_front();
        }
        buffer.push_back(LogEntry {
            timestamp,
            message: message.into(),
        });
    }

    /// Entries for `job_id`, oldest first; empty when nothing was logged
    pub async fn entries(&self, job_id: Uuid) -> Vec<LogEntry> {
        self.logs
            .read()
            .await
            .get(&job_id)
            .map(|buffer| buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn remove(&self, job_id: Uuid) -> bool {
        self.logs.write().await.remove(&job_id).is_some()
    }

    /// Drop buffers of inactive jobs whose newest entry is older than the retention window.
    pub async fn cleanup_stale(&self, active: &HashSet<Uuid>, now: DateTime<Utc>) -> usize {
        let retention = chrono::Duration::from_std(self.config.retention)
            .unwrap_or(chrono::Duration::MAX);
        let mut logs = self.logs.write().await;
        let before = logs.len();

        logs.retain(|job_id, buffer| {
            if active.contains(job_id) {
                return true;
            }
            match buffer.back() {
                Some(newest) => now.signed_duration_since(newest.timestamp) <= retention,
                None => false,
            }
        });

        let removed = before - logs.len();
        if removed > 0 {
            debug!("Removed {} stale stream log buffers", removed);
        }
        removed
    }

    pub async fn tracked_jobs(&self) -> usize {
        self.logs.read().await.len()
    }
}
