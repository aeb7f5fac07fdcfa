//! 用户天级活动指标 + 机器人判定结果

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "user_daily_metrics")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: String,
    pub date: Date,
    pub total_views: i64,
    pub total_likes: i64,
    pub total_comments: i64,
    pub total_activities: i64,
    #[sea_orm(column_type = "Double")]
    pub average_activities_per_minute: f64,
    /// NORMAL / WARNING_LEVEL_B / BANNED_LEVEL_A
    pub bot_detection_level: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub bot_detection_reason: Option<String>,
    /// 机器人判定完成时间；为空表示尚待判定
    pub classified_at: Option<DateTimeUtc>,
    pub is_payout_allowed: bool,
    #[sea_orm(column_type = "Double")]
    pub total_payout_idr: f64,
    /// UNPAID / PAID / SKIPPED / PAYOUT_ERROR_TX
    pub payout_status: String,
    pub payout_transaction_id: Option<String>,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
