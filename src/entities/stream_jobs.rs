use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "stream_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub status: String,
    pub video_id: Option<Uuid>,
    pub rtmp_url: String,
    pub stream_key: String,
    pub platform: Option<String>,
    pub platform_icon: Option<String>,
    pub loop_video: bool,
    pub use_advanced_settings: bool,
    pub resolution: Option<String>,
    pub bitrate: Option<i32>,
    pub fps: Option<i32>,
    pub schedule_time: Option<DateTimeUtc>,
    pub end_time: Option<DateTimeUtc>,
    pub start_time: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
