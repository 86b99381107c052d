use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "videos")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub filepath: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::playlist_videos::Entity")]
    PlaylistVideos,
}

impl Related<super::playlist_videos::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PlaylistVideos.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
