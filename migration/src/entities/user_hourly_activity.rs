use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "user_hourly_activity")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: String,
    /// 小时起点（UTC，整点）
    pub hour_start: DateTimeUtc,
    pub total_views: i64,
    pub total_likes: i64,
    pub total_comments: i64,
    pub total_activities: i64,
    #[sea_orm(column_type = "Double")]
    pub average_activities_per_minute: f64,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
