//! 账本记录（只追加，不修改）

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub user_id: String,
    /// EARNING
    pub tx_type: String,
    #[sea_orm(column_type = "Double")]
    pub amount_idr: f64,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub reference_id: String,
    /// PromotionPost / UserDailyMetric
    pub reference_type: String,
    /// COMPLETED
    pub status: String,
    pub processed_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
