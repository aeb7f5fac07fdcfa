//! 推广帖子实体
//!
//! 三条独立的状态机（抓取 / 机器人分析 / 结算）都落在这张表上，
//! 只由流水线各阶段修改，永不删除。

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "promotion_posts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub promotion_id: String,
    /// TIKTOK / INSTAGRAM / YOUTUBE
    pub platform: String,
    #[sea_orm(column_type = "Text")]
    pub post_url: String,
    pub external_post_id: Option<String>,
    pub fetch_status: String,
    pub bot_analysis_status: String,
    pub settlement_status: String,
    pub last_checked_at: Option<DateTimeUtc>,
    pub next_check_at: Option<DateTimeUtc>,
    pub consecutive_failures: i32,
    pub error_message: Option<String>,
    pub bot_analysis_reason: Option<String>,
    #[sea_orm(column_type = "Double", nullable)]
    pub bot_suspicion_score: Option<f64>,
    /// JSON of the derived metrics used by the last analysis
    #[sea_orm(column_type = "Text", nullable)]
    pub bot_analysis_details: Option<String>,
    pub analyzed_at: Option<DateTimeUtc>,
    /// 当前分析租约的令牌，写回结论时必须匹配
    pub analysis_lease: Option<String>,
    pub payout_transaction_id: Option<String>,
    #[sea_orm(column_type = "Double")]
    pub calculated_earnings_idr: f64,
    pub submitted_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::promotion::Entity",
        from = "Column::PromotionId",
        to = "super::promotion::Column::Id"
    )]
    Promotion,
}

impl Related<super::promotion::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Promotion.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
