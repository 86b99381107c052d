//! SeaORM stream job repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    sea_query::Expr,
};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::{playlist_videos, prelude::*, stream_jobs, videos};
use crate::errors::{RepositoryError, RepositoryResult};
use crate::models::{
    Playlist, StatusUpdateOptions, StreamJob, StreamJobWithSource, StreamSource, StreamStatus,
    Video,
};
use crate::repositories::traits::StreamJobStore;

/// SeaORM-based stream job repository
#[derive(Clone)]
pub struct StreamJobSeaOrmRepository {
    connection: Arc<DatabaseConnection>,
}

impl StreamJobSeaOrmRepository {
    pub fn new(connection: Arc<DatabaseConnection>) -> Self {
        Self { connection }
    }

    /// Insert a job record; used for seeding and by tooling that owns job creation.
    pub async fn create(&self, job: &StreamJob) -> RepositoryResult<StreamJob> {
        let active_model = stream_jobs::ActiveModel {
            id: Set(job.id),
            user_id: Set(job.user_id),
            title: Set(job.title.clone()),
            status: Set(job.status.to_string()),
            video_id: Set(job.video_id),
            rtmp_url: Set(job.rtmp_url.clone()),
            stream_key: Set(job.stream_key.clone()),
            platform: Set(job.platform.clone()),
            platform_icon: Set(job.platform_icon.clone()),
            loop_video: Set(job.loop_video),
            use_advanced_settings: Set(job.use_advanced_settings),
            resolution: Set(job.resolution.clone()),
            bitrate: Set(job.bitrate.map(|v| v as i32)),
            fps: Set(job.fps.map(|v| v as i32)),
            schedule_time: Set(job.schedule_time),
            end_time: Set(job.end_time),
            start_time: Set(job.start_time),
            created_at: Set(job.created_at),
            updated_at: Set(job.updated_at),
        };

        let model = active_model.insert(&*self.connection).await?;
        self.model_to_domain(model)
    }

    async fn load_video(&self, id: Uuid) -> RepositoryResult<Option<Video>> {
        let model = Videos::find_by_id(id).one(&*self.connection).await?;
        Ok(model.map(Self::video_to_domain))
    }

    async fn load_playlist(&self, id: Uuid) -> RepositoryResult<Option<Playlist>> {
        let Some(playlist) = Playlists::find_by_id(id).one(&*self.connection).await? else {
            return Ok(None);
        };

        let entries = PlaylistVideos::find()
            .filter(playlist_videos::Column::PlaylistId.eq(id))
            .order_by_asc(playlist_videos::Column::Position)
            .find_also_related(Videos)
            .all(&*self.connection)
            .await?;

        let videos = entries
            .into_iter()
            .filter_map(|(_, video)| video.map(Self::video_to_domain))
            .collect();

        Ok(Some(Playlist {
            id: playlist.id,
            name: playlist.name,
            shuffle: playlist.is_shuffle,
            videos,
        }))
    }

    fn video_to_domain(model: videos::Model) -> Video {
        Video {
            id: model.id,
            title: model.title,
            filepath: model.filepath,
        }
    }

    fn model_to_domain(&self, model: stream_jobs::Model) -> RepositoryResult<StreamJob> {
        let status = StreamStatus::from_str(&model.status).map_err(|_| {
            RepositoryError::invalid_data(
                "stream_jobs",
                format!("unknown status '{}' for job {}", model.status, model.id),
            )
        })?;

        Ok(StreamJob {
            id: model.id,
            user_id: model.user_id,
            title: model.title,
            status,
            video_id: model.video_id,
            rtmp_url: model.rtmp_url,
            stream_key: model.stream_key,
            platform: model.platform,
            platform_icon: model.platform_icon,
            loop_video: model.loop_video,
            use_advanced_settings: model.use_advanced_settings,
            resolution: model.resolution,
            bitrate: model.bitrate.and_then(|v| u32::try_from(v).ok()),
            fps: model.fps.and_then(|v| u32::try_from(v).ok()),
            schedule_time: model.schedule_time,
            end_time: model.end_time,
            start_time: model.start_time,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }

    fn models_to_domain(&self, models: Vec<stream_jobs::Model>) -> RepositoryResult<Vec<StreamJob>> {
        models.into_iter().map(|m| self.model_to_domain(m)).collect()
    }
}

#[async_trait]
impl StreamJobStore for StreamJobSeaOrmRepository {
    async fn find_by_id(&self, id: Uuid) -> RepositoryResult<Option<StreamJob>> {
        let model = StreamJobs::find_by_id(id).one(&*self.connection).await?;
        model.map(|m| self.model_to_domain(m)).transpose()
    }

    async fn find_all(
        &self,
        user_id: Option<Uuid>,
        status: Option<StreamStatus>,
    ) -> RepositoryResult<Vec<StreamJob>> {
        let mut query = StreamJobs::find();
        if let Some(user_id) = user_id {
            query = query.filter(stream_jobs::Column::UserId.eq(user_id));
        }
        if let Some(status) = status {
            query = query.filter(stream_jobs::Column::Status.eq(status.to_string()));
        }

        let models = query
            .order_by_asc(stream_jobs::Column::CreatedAt)
            .all(&*self.connection)
            .await?;
        self.models_to_domain(models)
    }

    async fn find_scheduled_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepositoryResult<Vec<StreamJob>> {
        let models = StreamJobs::find()
            .filter(stream_jobs::Column::Status.eq(StreamStatus::Scheduled.to_string()))
            .filter(stream_jobs::Column::ScheduleTime.gte(from))
            .filter(stream_jobs::Column::ScheduleTime.lte(to))
            .order_by_asc(stream_jobs::Column::ScheduleTime)
            .all(&*self.connection)
            .await?;
        self.models_to_domain(models)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: StreamStatus,
        user_id: Option<Uuid>,
        options: StatusUpdateOptions,
    ) -> RepositoryResult<()> {
        let now = Utc::now();
        let mut update = StreamJobs::update_many()
            .col_expr(stream_jobs::Column::Status, Expr::value(status.to_string()))
            .col_expr(stream_jobs::Column::UpdatedAt, Expr::value(now))
            .filter(stream_jobs::Column::Id.eq(id));

        if status == StreamStatus::Live {
            let start_time = options.start_time_override.unwrap_or(now);
            update = update.col_expr(stream_jobs::Column::StartTime, Expr::value(start_time));
        }
        if let Some(user_id) = user_id {
            update = update.filter(stream_jobs::Column::UserId.eq(user_id));
        }

        update.exec(&*self.connection).await?;
        Ok(())
    }

    async fn get_with_source(&self, id: Uuid) -> RepositoryResult<Option<StreamJobWithSource>> {
        let Some(job) = self.find_by_id(id).await? else {
            return Ok(None);
        };

        let source = match job.video_id {
            Some(source_id) => match self.load_video(source_id).await? {
                Some(video) => Some(StreamSource::Video(video)),
                None => self.load_playlist(source_id).await?.map(StreamSource::Playlist),
            },
            None => None,
        };

        Ok(Some(StreamJobWithSource { job, source }))
    }
}
