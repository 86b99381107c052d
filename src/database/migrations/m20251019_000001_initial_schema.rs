use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_videos_table(manager).await?;
        self.create_playlists_table(manager).await?;
        self.create_playlist_videos_table(manager).await?;
        self.create_stream_jobs_table(manager).await?;
        self.create_stream_history_table(manager).await?;

        self.create_indexes(manager).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StreamHistory::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(StreamJobs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PlaylistVideos::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Playlists::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Videos::Table).to_owned())
            .await?;

        Ok(())
    }
}

impl Migration {
    fn uuid_column(&self, manager: &SchemaManager, column: impl IntoIden) -> ColumnDef {
        let mut col = ColumnDef::new(column);
        match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => col.uuid().not_null(),
            _ => col.string().not_null(),
        };
        col
    }

    fn nullable_uuid_column(&self, manager: &SchemaManager, column: impl IntoIden) -> ColumnDef {
        let mut col = ColumnDef::new(column);
        match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => col.uuid(),
            _ => col.string(),
        };
        col
    }

    fn timestamp_column(&self, manager: &SchemaManager, column: impl IntoIden) -> ColumnDef {
        let mut col = ColumnDef::new(column);
        match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => col.timestamp_with_time_zone().not_null(),
            _ => col.string().not_null(),
        };
        col
    }

    fn nullable_timestamp_column(&self, manager: &SchemaManager, column: impl IntoIden) -> ColumnDef {
        let mut col = ColumnDef::new(column);
        match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => col.timestamp_with_time_zone(),
            _ => col.string(),
        };
        col
    }

    async fn create_videos_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Videos::Table)
                    .if_not_exists()
                    .col(self.uuid_column(manager, Videos::Id).primary_key())
                    .col(self.uuid_column(manager, Videos::UserId))
                    .col(ColumnDef::new(Videos::Title).string().not_null())
                    .col(ColumnDef::new(Videos::Filepath).string().not_null())
                    .col(self.timestamp_column(manager, Videos::CreatedAt))
                    .to_owned(),
            )
            .await
    }

    async fn create_playlists_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Playlists::Table)
                    .if_not_exists()
                    .col(self.uuid_column(manager, Playlists::Id).primary_key())
                    .col(self.uuid_column(manager, Playlists::UserId))
                    .col(ColumnDef::new(Playlists::Name).string().not_null())
                    .col(
                        ColumnDef::new(Playlists::IsShuffle)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(self.timestamp_column(manager, Playlists::CreatedAt))
                    .to_owned(),
            )
            .await
    }

    async fn create_playlist_videos_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PlaylistVideos::Table)
                    .if_not_exists()
                    .col(self.uuid_column(manager, PlaylistVideos::Id).primary_key())
                    .col(self.uuid_column(manager, PlaylistVideos::PlaylistId))
                    .col(self.uuid_column(manager, PlaylistVideos::VideoId))
                    .col(ColumnDef::new(PlaylistVideos::Position).integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_playlist_videos_playlist_id")
                            .from(PlaylistVideos::Table, PlaylistVideos::PlaylistId)
                            .to(Playlists::Table, Playlists::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_playlist_videos_video_id")
                            .from(PlaylistVideos::Table, PlaylistVideos::VideoId)
                            .to(Videos::Table, Videos::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn create_stream_jobs_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(StreamJobs::Table)
                    .if_not_exists()
                    .col(self.uuid_column(manager, StreamJobs::Id).primary_key())
                    .col(self.uuid_column(manager, StreamJobs::UserId))
                    .col(ColumnDef::new(StreamJobs::Title).string().not_null())
                    .col(
                        ColumnDef::new(StreamJobs::Status)
                            .string()
                            .not_null()
                            .default("scheduled"),
                    )
                    .col(self.nullable_uuid_column(manager, StreamJobs::VideoId))
                    .col(ColumnDef::new(StreamJobs::RtmpUrl).string().not_null())
                    .col(ColumnDef::new(StreamJobs::StreamKey).string().not_null())
                    .col(ColumnDef::new(StreamJobs::Platform).string())
                    .col(ColumnDef::new(StreamJobs::PlatformIcon).string())
                    .col(
                        ColumnDef::new(StreamJobs::LoopVideo)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(StreamJobs::UseAdvancedSettings)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(StreamJobs::Resolution).string())
                    .col(ColumnDef::new(StreamJobs::Bitrate).integer())
                    .col(ColumnDef::new(StreamJobs::Fps).integer())
                    .col(self.nullable_timestamp_column(manager, StreamJobs::ScheduleTime))
                    .col(self.nullable_timestamp_column(manager, StreamJobs::EndTime))
                    .col(self.nullable_timestamp_column(manager, StreamJobs::StartTime))
                    .col(self.timestamp_column(manager, StreamJobs::CreatedAt))
                    .col(self.timestamp_column(manager, StreamJobs::UpdatedAt))
                    .to_owned(),
            )
            .await
    }

    async fn create_stream_history_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(StreamHistory::Table)
                    .if_not_exists()
                    .col(self.uuid_column(manager, StreamHistory::Id).primary_key())
                    .col(self.uuid_column(manager, StreamHistory::StreamId))
                    .col(self.uuid_column(manager, StreamHistory::UserId))
                    .col(ColumnDef::new(StreamHistory::Title).string().not_null())
                    .col(
                        ColumnDef::new(StreamHistory::Platform)
                            .string()
                            .not_null()
                            .default("Custom"),
                    )
                    .col(ColumnDef::new(StreamHistory::PlatformIcon).string())
                    .col(self.nullable_uuid_column(manager, StreamHistory::VideoId))
                    .col(ColumnDef::new(StreamHistory::VideoTitle).string())
                    .col(ColumnDef::new(StreamHistory::Resolution).string())
                    .col(ColumnDef::new(StreamHistory::Bitrate).integer())
                    .col(ColumnDef::new(StreamHistory::Fps).integer())
                    .col(
                        ColumnDef::new(StreamHistory::UseAdvancedSettings)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(self.timestamp_column(manager, StreamHistory::StartTime))
                    .col(self.timestamp_column(manager, StreamHistory::EndTime))
                    .col(
                        ColumnDef::new(StreamHistory::DurationSeconds)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn create_indexes(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_stream_jobs_status_schedule_time")
                    .table(StreamJobs::Table)
                    .col(StreamJobs::Status)
                    .col(StreamJobs::ScheduleTime)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_stream_jobs_user_id")
                    .table(StreamJobs::Table)
                    .col(StreamJobs::UserId)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_stream_history_stream_id")
                    .table(StreamHistory::Table)
                    .col(StreamHistory::StreamId)
                    .to_owned(),
            )
            .await?;
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_playlist_videos_playlist_id")
                    .table(PlaylistVideos::Table)
                    .col(PlaylistVideos::PlaylistId)
                    .col(PlaylistVideos::Position)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Videos {
    Table,
    Id,
    UserId,
    Title,
    Filepath,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Playlists {
    Table,
    Id,
    UserId,
    Name,
    IsShuffle,
    CreatedAt,
}

#[derive(DeriveIden)]
enum PlaylistVideos {
    Table,
    Id,
    PlaylistId,
    VideoId,
    Position,
}

#[derive(DeriveIden)]
enum StreamJobs {
    Table,
    Id,
    UserId,
    Title,
    Status,
    VideoId,
    RtmpUrl,
    StreamKey,
    Platform,
    PlatformIcon,
    LoopVideo,
    UseAdvancedSettings,
    Resolution,
    Bitrate,
    Fps,
    ScheduleTime,
    EndTime,
    StartTime,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum StreamHistory {
    Table,
    Id,
    StreamId,
    UserId,
    Title,
    Platform,
    PlatformIcon,
    VideoId,
    VideoTitle,
    Resolution,
    Bitrate,
    Fps,
    UseAdvancedSettings,
    StartTime,
    EndTime,
    DurationSeconds,
}
