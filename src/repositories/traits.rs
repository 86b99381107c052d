//! Repository traits for stream jobs and run history

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::RepositoryResult;
use crate::models::{
    StatusUpdateOptions, StreamHistoryRecord, StreamJob, StreamJobWithSource, StreamStatus,
};

/// Read/write access to stream job records
///
/// Implementations must be safe to share across tasks; every lifecycle
/// component holds an `Arc<dyn StreamJobStore>`.
#[async_trait]
pub trait StreamJobStore: Send + Sync {
    /// Find a job by id
    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<StreamJob>>;

    /// List jobs, optionally filtered by owner and status
    async fn find_all(
        &self,
        user_id: Option<Uuid>,
        status: Option<StreamStatus>,
    ) -> RepositoryResult<Vec<StreamJob>>;

    /// Jobs in `scheduled` status whose schedule time falls inside `[from, to]`
    async fn find_scheduled_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepositoryResult<Vec<StreamJob>>;

    /// Write a new status.
    ///
    /// Moving to `live` records `options.start_time_override` (or now) as the
    /// start time; other statuses leave the start time alone. When `user_id`
    /// is given, only a job owned by that user is touched.
    async fn update_status(
        &self,
        id: Uuid,
        status: StreamStatus,
        user_id: Option<Uuid>,
        options: StatusUpdateOptions,
    ) -> RepositoryResult<()>;

    /// Find a job together with the video or playlist it streams
    async fn get_with_source(&self, id: Uuid) -> RepositoryResult<Option<StreamJobWithSource>>;
}

/// Destination for completed-run summaries
#[async_trait]
pub trait StreamHistorySink: Send + Sync {
    async fn record(&self, record: StreamHistoryRecord) -> RepositoryResult<()>;
}
