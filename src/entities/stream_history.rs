use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "stream_history")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub stream_id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub platform: String,
    pub platform_icon: Option<String>,
    pub video_id: Option<Uuid>,
    pub video_title: Option<String>,
    pub resolution: Option<String>,
    pub bitrate: Option<i32>,
    pub fps: Option<i32>,
    pub use_advanced_settings: bool,
    pub start_time: DateTimeUtc,
    pub end_time: DateTimeUtc,
    pub duration_seconds: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
