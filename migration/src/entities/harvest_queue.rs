//! Durable harvest request queue

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "harvest_queue")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// JSON body, e.g. {"promotionPostId":"..."}
    #[sea_orm(column_type = "Text")]
    pub payload: String,
    /// PENDING / LEASED / DONE / DEAD
    pub status: String,
    pub attempts: i32,
    /// 下次可被领取的时间（租约到期或延迟重投）
    pub available_at: DateTimeUtc,
    #[sea_orm(column_type = "Text", nullable)]
    pub last_error: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
