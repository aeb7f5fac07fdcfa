//! 推广者 / 创作者账户

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    /// ACTIVE / SUSPENDED / BANNED
    pub status: String,
    #[sea_orm(column_type = "Double")]
    pub balance_idr: f64,
    #[sea_orm(column_type = "Double")]
    pub total_earned_idr: f64,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
