//! SeaORM stream history repository implementation

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::{prelude::*, stream_history};
use crate::errors::RepositoryResult;
use crate::models::StreamHistoryRecord;
use crate::repositories::traits::StreamHistorySink;

#[derive(Clone)]
pub struct StreamHistorySeaOrmRepository {
    connection: Arc<DatabaseConnection>,
}

impl StreamHistorySeaOrmRepository {
    pub fn new(connection: Arc<DatabaseConnection>) -> Self {
        Self { connection }
    }

    /// Runs of one stream, newest first
    pub async fn find_by_stream(&self, stream_id: Uuid) -> RepositoryResult<Vec<StreamHistoryRecord>> {
        let models = StreamHistory::find()
            .filter(stream_history::Column::StreamId.eq(stream_id))
            .order_by_desc(stream_history::Column::EndTime)
            .all(&*self.connection)
            .await?;
        Ok(models.into_iter().map(Self::model_to_domain).collect())
    }

    fn model_to_domain(model: stream_history::Model) -> StreamHistoryRecord {
        StreamHistoryRecord {
            id: model.id,
            stream_id: model.stream_id,
            user_id: model.user_id,
            title: model.title,
            platform: model.platform,
            platform_icon: model.platform_icon,
            video_id: model.video_id,
            video_title: model.video_title,
            resolution: model.resolution,
            bitrate: model.bitrate.and_then(|v| u32::try_from(v).ok()),
            fps: model.fps.and_then(|v| u32::try_from(v).ok()),
            use_advanced_settings: model.use_advanced_settings,
            start_time: model.start_time,
            end_time: model.end_time,
            duration_seconds: model.duration_seconds,
        }
    }
}

#[async_trait]
impl StreamHistorySink for StreamHistorySeaOrmRepository {
    async fn record(&self, record: StreamHistoryRecord) -> RepositoryResult<()> {
        let active_model = stream_history::ActiveModel {
            id: Set(record.id),
            stream_id: Set(record.stream_id),
            user_id: Set(record.user_id),
            title: Set(record.title),
            platform: Set(record.platform),
            platform_icon: Set(record.platform_icon),
            video_id: Set(record.video_id),
            video_title: Set(record.video_title),
            resolution: Set(record.resolution),
            bitrate: Set(record.bitrate.map(|v| v as i32)),
            fps: Set(record.fps.map(|v| v as i32)),
            use_advanced_settings: Set(record.use_advanced_settings),
            start_time: Set(record.start_time),
            end_time: Set(record.end_time),
            duration_seconds: Set(record.duration_seconds),
        };
        active_model.insert(&*self.connection).await?;
        Ok(())
    }
}
