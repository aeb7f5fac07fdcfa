//! 用户日活动结算
//!
//! 金额 = `average_activities_per_minute × daily_rate_fee_idr`。
//! 仍在等待判定的行不处理；被判定禁止结算或活动量为 0 的行记为 SKIPPED。

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    ActiveValue::{Set, Unchanged},
    ColumnTrait, DbErr, EntityTrait, QueryFilter, TransactionTrait, sea_query::Expr,
};
use tracing::{error, info, warn};

use super::posts::SettlementEngine;
use super::{Earning, MIN_PAYOUT_IDR, credit_earning};
use crate::errors::Result;
use crate::storage::backend::retry;
use crate::storage::models::{DailyPayoutStatus, ReferenceType, UserStatus};
use crate::utils::round2;
use migration::entities::user_daily_metric;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailySettlementReport {
    pub selected: usize,
    pub paid: usize,
    pub skipped: usize,
    pub awaiting_detection: usize,
    pub errors: usize,
    pub total_paid_idr: f64,
}

enum DailyOutcome {
    Paid(f64),
    Skipped,
    /// 其他 worker 已处理
    Lost,
}

impl SettlementEngine {
    pub fn daily_amount(&self, average_per_minute: f64) -> f64 {
        round2(average_per_minute * self.config.daily_rate_fee_idr)
    }

    /// 结算某天所有已判定、未结算的用户日指标
    pub async fn settle_day(&self, date: NaiveDate) -> Result<DailySettlementReport> {
        let mut report = DailySettlementReport::default();
        if !self.config.daily_payout_enabled {
            info!("Daily activity payout disabled, skipping {}", date);
            return Ok(report);
        }

        let rows = user_daily_metric::Entity::find()
            .filter(user_daily_metric::Column::Date.eq(date))
            .filter(user_daily_metric::Column::PayoutStatus.eq(DailyPayoutStatus::Unpaid.as_str()))
            .all(self.storage.get_db())
            .await?;
        report.selected = rows.len();

        for row in rows {
            if row.classified_at.is_none() {
                report.awaiting_detection += 1;
                continue;
            }

            let now = Utc::now();
            let amount = self.daily_amount(row.average_activities_per_minute);
            let user_active = self
                .storage
                .find_user(&row.user_id)
                .await?
                .is_some_and(|u| u.status == UserStatus::Active.as_str());

            if !row.is_payout_allowed || !user_active || amount < MIN_PAYOUT_IDR {
                self.mark_daily(row.id, DailyPayoutStatus::Skipped, now).await?;
                report.skipped += 1;
                continue;
            }

            match self.commit_daily(&row, amount, now).await {
                Ok(DailyOutcome::Paid(paid)) => {
                    report.paid += 1;
                    report.total_paid_idr += paid;
                }
                Ok(DailyOutcome::Skipped) => report.skipped += 1,
                Ok(DailyOutcome::Lost) => {}
                Err(e) => {
                    error!("Daily payout for metric {} failed: {}", row.id, e);
                    self.mark_daily(row.id, DailyPayoutStatus::PayoutErrorTx, Utc::now())
                        .await?;
                    report.errors += 1;
                }
            }
        }

        info!(
            "Daily settlement for {}: {} paid ({:.2} IDR), {} skipped, {} awaiting detection, {} errors",
            date,
            report.paid,
            report.total_paid_idr,
            report.skipped,
            report.awaiting_detection,
            report.errors
        );
        Ok(report)
    }

    async fn commit_daily(
        &self,
        row: &user_daily_metric::Model,
        amount: f64,
        now: DateTime<Utc>,
    ) -> std::result::Result<DailyOutcome, DbErr> {
        let txn = self.storage.get_db().begin().await?;

        // 条件更新兼作租约
        let claimed = user_daily_metric::Entity::update_many()
            .col_expr(
                user_daily_metric::Column::PayoutStatus,
                Expr::value(DailyPayoutStatus::Paid.as_str()),
            )
            .col_expr(user_daily_metric::Column::UpdatedAt, Expr::value(now))
            .filter(user_daily_metric::Column::Id.eq(row.id))
            .filter(user_daily_metric::Column::PayoutStatus.eq(DailyPayoutStatus::Unpaid.as_str()))
            .filter(user_daily_metric::Column::IsPayoutAllowed.eq(true))
            .exec(&txn)
            .await?;
        if claimed.rows_affected != 1 {
            txn.rollback().await?;
            warn!("Daily metric {} changed during settlement, skipping", row.id);
            return Ok(DailyOutcome::Lost);
        }

        let reference_id = row.id.to_string();
        let earning = Earning {
            user_id: &row.user_id,
            amount_idr: amount,
            reference_id: &reference_id,
            reference_type: ReferenceType::UserDailyMetric,
            description: format!(
                "Daily activity earning for {} ({:.4} activities/min)",
                row.date, row.average_activities_per_minute
            ),
        };
        let (transaction_id, created) = credit_earning(&txn, &earning, now).await?;

        user_daily_metric::Entity::update(user_daily_metric::ActiveModel {
            id: Unchanged(row.id),
            total_payout_idr: Set(amount),
            payout_transaction_id: Set(Some(transaction_id)),
            updated_at: Set(now),
            ..Default::default()
        })
        .exec(&txn)
        .await?;

        txn.commit().await?;
        Ok(if created {
            DailyOutcome::Paid(amount)
        } else {
            DailyOutcome::Skipped
        })
    }

    async fn mark_daily(&self, id: i64, status: DailyPayoutStatus, now: DateTime<Utc>) -> Result<()> {
        let db = self.storage.get_db();
        retry::with_retry(
            &format!("mark_daily_payout({})", id),
            self.storage.retry_config(),
            || {
                user_daily_metric::Entity::update_many()
                    .col_expr(user_daily_metric::Column::PayoutStatus, Expr::value(status.as_str()))
                    .col_expr(user_daily_metric::Column::UpdatedAt, Expr::value(now))
                    .filter(user_daily_metric::Column::Id.eq(id))
                    .exec(db)
            },
        )
        .await?;
        Ok(())
    }
}
