//! 结算
//!
//! - [`posts`]：帖子按浏览量结算
//! - [`daily`]：用户日活动结算
//!
//! 两者共用同一套账本写入：一笔 EARNING 交易 + 余额累加，在同一数据库事务内完成。
//! 事务失败不自动重试，落到 `PAYOUT_ERROR_TX` 由人工处理。

pub mod daily;
pub mod posts;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, ExprTrait, QueryFilter,
    sea_query::Expr,
};

use crate::config::SettlementConfig;
use crate::errors::{PromoGuardError, Result};
use crate::storage::models::{ReferenceType, TransactionStatus, TransactionType};
use crate::utils::round2;
use migration::entities::{platform_metric_snapshot, transaction, user};

pub use daily::DailySettlementReport;
pub use posts::{PostSettlement, SettlementEngine, SettlementReport};

/// 低于该金额不写账本
pub const MIN_PAYOUT_IDR: f64 = 0.01;

/// 帖子结算金额公式
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PayoutFormula {
    /// `views × rate`
    ViewsOnly,
    /// `(views + likes·like_weight + comments·comment_weight) × rate`
    Weighted { like_weight: f64, comment_weight: f64 },
}

impl PayoutFormula {
    pub fn from_config(config: &SettlementConfig) -> Result<Self> {
        match config.formula.trim().to_ascii_lowercase().as_str() {
            "" | "views_only" => Ok(PayoutFormula::ViewsOnly),
            "weighted" => Ok(PayoutFormula::Weighted {
                like_weight: config.like_weight,
                comment_weight: config.comment_weight,
            }),
            other => Err(PromoGuardError::config(format!(
                "Unknown payout formula '{}', expected 'views_only' or 'weighted'",
                other
            ))),
        }
    }

    /// 按最新快照计算金额，保留两位小数
    pub fn amount(&self, snapshot: &platform_metric_snapshot::Model, rate_per_viewer: f64) -> f64 {
        let units = match *self {
            PayoutFormula::ViewsOnly => snapshot.views as f64,
            PayoutFormula::Weighted {
                like_weight,
                comment_weight,
            } => {
                snapshot.views as f64
                    + snapshot.likes as f64 * like_weight
                    + snapshot.comments as f64 * comment_weight
            }
        };
        round2((units * rate_per_viewer).max(0.0))
    }
}

/// 一笔待入账的收入
#[derive(Debug, Clone)]
pub(crate) struct Earning<'a> {
    pub user_id: &'a str,
    pub amount_idr: f64,
    pub reference_id: &'a str,
    pub reference_type: ReferenceType,
    pub description: String,
}

/// 在调用方的事务内记账
///
/// 同一引用已有 EARNING 时返回已有交易号，不重复加余额。
/// 返回 `(transaction_id, newly_created)`。
pub(crate) async fn credit_earning<C>(
    conn: &C,
    earning: &Earning<'_>,
    now: DateTime<Utc>,
) -> std::result::Result<(String, bool), DbErr>
where
    C: ConnectionTrait,
{
    let existing = transaction::Entity::find()
        .filter(transaction::Column::ReferenceId.eq(earning.reference_id))
        .filter(transaction::Column::ReferenceType.eq(earning.reference_type.as_str()))
        .filter(transaction::Column::TxType.eq(TransactionType::Earning.as_str()))
        .one(conn)
        .await?;
    if let Some(tx) = existing {
        return Ok((tx.id, false));
    }

    let tx_id = uuid::Uuid::new_v4().to_string();
    transaction::Entity::insert(transaction::ActiveModel {
        id: Set(tx_id.clone()),
        user_id: Set(earning.user_id.to_string()),
        tx_type: Set(TransactionType::Earning.as_str().to_string()),
        amount_idr: Set(earning.amount_idr),
        description: Set(Some(earning.description.clone())),
        reference_id: Set(earning.reference_id.to_string()),
        reference_type: Set(earning.reference_type.as_str().to_string()),
        status: Set(TransactionStatus::Completed.as_str().to_string()),
        processed_at: Set(Some(now)),
        created_at: Set(now),
    })
    .exec_without_returning(conn)
    .await?;

    let updated = user::Entity::update_many()
        .col_expr(
            user::Column::BalanceIdr,
            Expr::col(user::Column::BalanceIdr).add(earning.amount_idr),
        )
        .col_expr(
            user::Column::TotalEarnedIdr,
            Expr::col(user::Column::TotalEarnedIdr).add(earning.amount_idr),
        )
        .col_expr(user::Column::UpdatedAt, Expr::value(now))
        .filter(user::Column::Id.eq(earning.user_id))
        .exec(conn)
        .await?;
    if updated.rows_affected != 1 {
        return Err(DbErr::RecordNotUpdated);
    }

    Ok((tx_id, true))
}
