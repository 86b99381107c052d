//! In-process job store
//!
//! Backs tests and ephemeral runs where no database is configured. Both
//! traits are implemented on the same value so one `Arc` can serve as
//! store and history sink.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::traits::{StreamHistorySink, StreamJobStore};
use crate::errors::{RepositoryError, RepositoryResult};
use crate::models::{
    StatusUpdateOptions, StreamHistoryRecord, StreamJob, StreamJobWithSource, StreamSource,
    StreamStatus,
};

#[derive(Default)]
pub struct InMemoryStreamStore {
    jobs: RwLock<HashMap<Uuid, StreamJob>>,
    sources: RwLock<HashMap<Uuid, StreamSource>>,
    history: RwLock<Vec<StreamHistoryRecord>>,
    fail_writes: AtomicBool,
}

impl InMemoryStreamStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_job(&self, job: StreamJob) {
        self.jobs.write().await.insert(job.id, job);
    }

    pub async fn remove_job(&self, id: Uuid) -> Option<StreamJob> {
        self.jobs.write().await.remove(&id)
    }

    /// Register a video or playlist under its own id so jobs can reference it via `video_id`.
    pub async fn insert_source(&self, source: StreamSource) {
        let id = match &source {
            StreamSource::Video(video) => video.id,
            StreamSource::Playlist(playlist) => playlist.id,
        };
        self.sources.write().await.insert(id, source);
    }

    /// Overwrite a job's end time, as an operator edit would.
    pub async fn set_end_time(&self, id: Uuid, end_time: Option<DateTime<Utc>>) {
        if let Some(job) = self.jobs.write().await.get_mut(&id) {
            job.end_time = end_time;
            job.updated_at = Utc::now();
        }
    }

    pub async fn history(&self) -> Vec<StreamHistoryRecord> {
        self.history.read().await.clone()
    }

    /// Make subsequent status writes fail with `RepositoryError::Unavailable`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl StreamJobStore for InMemoryStreamStore {
    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<StreamJob>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn find_all(
        &self,
        user_id: Option<Uuid>,
        status: Option<StreamStatus>,
    ) -> RepositoryResult<Vec<StreamJob>> {
        let jobs = self.jobs.read().await;
        let mut matching: Vec<StreamJob> = jobs
            .values()
            .filter(|job| user_id.is_none_or(|u| job.user_id == u))
            .filter(|job| status.is_none_or(|s| job.status == s))
            .cloned()
            .collect();
        matching.sort_by_key(|job| job.created_at);
        Ok(matching)
    }

    async fn find_scheduled_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepositoryResult<Vec<StreamJob>> {
        let jobs = self.jobs.read().await;
        let mut matching: Vec<StreamJob> = jobs
            .values()
            .filter(|job| job.status == StreamStatus::Scheduled)
            .filter(|job| job.schedule_time.is_some_and(|t| t >= from && t <= to))
            .cloned()
            .collect();
        matching.sort_by_key(|job| job.schedule_time);
        Ok(matching)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: StreamStatus,
        user_id: Option<Uuid>,
        options: StatusUpdateOptions,
    ) -> RepositoryResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::unavailable("status writes disabled"));
        }

        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(());
        };
        if user_id.is_some_and(|u| job.user_id != u) {
            return Ok(());
        }

        let now = Utc::now();
        job.status = status;
        if status == StreamStatus::Live {
            job.start_time = Some(options.start_time_override.unwrap_or(now));
        }
        job.updated_at = now;
        Ok(())
    }

    async fn get_with_source(&self, id: Uuid) -> RepositoryResult<Option<StreamJobWithSource>> {
        let Some(job) = self.find_by_id(id).await? else {
            return Ok(None);
        };
        let source = match job.video_id {
            Some(video_id) => self.sources.read().await.get(&video_id).cloned(),
            None => None,
        };
        Ok(Some(StreamJobWithSource { job, source }))
    }
}

#[async_trait]
impl StreamHistorySink for InMemoryStreamStore {
    async fn record(&self, record: StreamHistoryRecord) -> RepositoryResult<()> {
        self.history.write().await.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::models::Video;

    fn job_at(schedule_time: DateTime<Utc>) -> StreamJob {
        let mut job = StreamJob::new(Uuid::new_v4(), "t", "rtmp://host/app", "key");
        job.schedule_time = Some(schedule_time);
        job
    }

    #[tokio::test]
    async fn scheduled_range_is_inclusive_and_status_filtered() {
        let store = InMemoryStreamStore::new();
        let now = Utc::now();
        let inside = job_at(now + Duration::seconds(30));
        let edge = job_at(now + Duration::seconds(60));
        let outside = job_at(now + Duration::seconds(61));
        let mut live = job_at(now);
        live.status = StreamStatus::Live;

        for job in [&inside, &edge, &outside, &live] {
            store.insert_job(job.clone()).await;
        }

        let found = store
            .find_scheduled_in_range(now, now + Duration::seconds(60))
            .await
            .unwrap();
        let ids: Vec<Uuid> = found.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![inside.id, edge.id]);
    }

    #[tokio::test]
    async fn going_live_records_start_time_and_offline_keeps_it() {
        let store = InMemoryStreamStore::new();
        let job = job_at(Utc::now());
        store.insert_job(job.clone()).await;
        let started = Utc::now() - Duration::seconds(5);

        store
            .update_status(job.id, StreamStatus::Live, None, StatusUpdateOptions::started_at(started))
            .await
            .unwrap();
        store
            .update_status(job.id, StreamStatus::Offline, None, StatusUpdateOptions::default())
            .await
            .unwrap();

        let stored = store.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, StreamStatus::Offline);
        assert_eq!(stored.start_time, Some(started));
    }

    #[tokio::test]
    async fn user_scoped_update_ignores_foreign_jobs() {
        let store = InMemoryStreamStore::new();
        let job = job_at(Utc::now());
        store.insert_job(job.clone()).await;

        store
            .update_status(job.id, StreamStatus::Live, Some(Uuid::new_v4()), StatusUpdateOptions::default())
            .await
            .unwrap();

        let stored = store.find_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, StreamStatus::Scheduled);
    }

    #[tokio::test]
    async fn resolves_registered_source() {
        let store = InMemoryStreamStore::new();
        let video = Video {
            id: Uuid::new_v4(),
            title: "intro".to_string(),
            filepath: "/uploads/intro.mp4".to_string(),
        };
        store.insert_source(StreamSource::Video(video.clone())).await;

        let mut job = job_at(Utc::now());
        job.video_id = Some(video.id);
        store.insert_job(job.clone()).await;

        let resolved = store.get_with_source(job.id).await.unwrap().unwrap();
        assert_eq!(resolved.source, Some(StreamSource::Video(video)));

        let mut missing = job_at(Utc::now());
        missing.video_id = Some(Uuid::new_v4());
        store.insert_job(missing.clone()).await;
        assert_eq!(store.get_with_source(missing.id).await.unwrap().unwrap().source, None);
    }
}
