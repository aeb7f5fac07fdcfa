//! Append-only metrics reading for one post

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "platform_metric_snapshots")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub promotion_post_id: String,
    pub fetched_at: DateTimeUtc,
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    pub shares: Option<i64>,
    #[sea_orm(column_type = "Text", nullable)]
    pub raw_payload: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
