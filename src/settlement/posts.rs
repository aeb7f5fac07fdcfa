//! 帖子结算引擎
//!
//! `PAYOUT_PROCESSING` 充当轻量租约：先条件更新领取，再计算金额并入账，
//! 保证并发运行的多个引擎处理互不重叠的帖子。
//! 领取后的任何失败都落到 `PAYOUT_ERROR_TX`；进程在持有租约时崩溃的帖子，
//! 租约过期后由下一轮扫描转为 `PAYOUT_ERROR_TX`。

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveValue::{Set, Unchanged},
    ColumnTrait, DbErr, EntityTrait, ExprTrait, QueryFilter, QueryOrder, QuerySelect,
    TransactionTrait, sea_query::Expr,
};
use tracing::{debug, error, info, warn};

use super::{Earning, MIN_PAYOUT_IDR, PayoutFormula, credit_earning};
use crate::config::SettlementConfig;
use crate::errors::{PromoGuardError, Result};
use crate::storage::SeaOrmStorage;
use crate::storage::backend::retry;
use crate::storage::models::{
    BotAnalysisStatus, FetchStatus, PromotionStatus, ReferenceType, SettlementStatus, UserStatus,
};
use crate::utils::truncate_reason;
use migration::entities::{promotion, promotion_post};

/// 单个帖子的结算结果
#[derive(Debug, Clone, PartialEq)]
pub enum PostSettlement {
    /// 已是 PAID / PAYOUT_PROCESSING / PAYOUT_REJECTED
    AlreadySettled(SettlementStatus),
    /// 不满足结算条件（未分析为 NORMAL、推广未批准等），状态不变
    NotEligible(String),
    /// 其他 worker 已领取
    LeaseLost,
    DataError(String),
    Rejected(String),
    /// 金额低于下限，记为零金额完成
    ZeroPayout,
    Paid { transaction_id: String, amount_idr: f64 },
    TxError(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettlementReport {
    pub selected: usize,
    pub paid: usize,
    pub zero_payout: usize,
    pub rejected: usize,
    pub errors: usize,
    pub skipped: usize,
    /// 租约过期被转为 PAYOUT_ERROR_TX 的帖子
    pub stale_recovered: u64,
    pub total_paid_idr: f64,
}

impl SettlementReport {
    fn record(&mut self, outcome: &PostSettlement) {
        match outcome {
            PostSettlement::Paid { amount_idr, .. } => {
                self.paid += 1;
                self.total_paid_idr += amount_idr;
            }
            PostSettlement::ZeroPayout => self.zero_payout += 1,
            PostSettlement::Rejected(_) => self.rejected += 1,
            PostSettlement::DataError(_) | PostSettlement::TxError(_) => self.errors += 1,
            PostSettlement::AlreadySettled(_)
            | PostSettlement::NotEligible(_)
            | PostSettlement::LeaseLost => self.skipped += 1,
        }
    }
}

pub struct SettlementEngine {
    pub(super) storage: Arc<SeaOrmStorage>,
    pub(super) config: SettlementConfig,
    formula: PayoutFormula,
}

impl SettlementEngine {
    pub fn new(storage: Arc<SeaOrmStorage>, config: SettlementConfig) -> Result<Self> {
        let formula = PayoutFormula::from_config(&config)?;
        Ok(Self {
            storage,
            config,
            formula,
        })
    }

    pub fn formula(&self) -> PayoutFormula {
        self.formula
    }

    fn min_payout(&self) -> f64 {
        self.config.min_payout_idr.max(MIN_PAYOUT_IDR)
    }

    /// 可结算的帖子：分析为 NORMAL、抓取成功、推广已批准、尚未结算
    pub async fn eligible_posts(&self) -> Result<Vec<promotion_post::Model>> {
        Ok(promotion_post::Entity::find()
            .inner_join(promotion::Entity)
            .filter(promotion::Column::Status.eq(PromotionStatus::Approved.as_str()))
            .filter(
                promotion_post::Column::BotAnalysisStatus.eq(BotAnalysisStatus::Normal.as_str()),
            )
            .filter(promotion_post::Column::FetchStatus.eq(FetchStatus::FetchedSuccess.as_str()))
            .filter(promotion_post::Column::SettlementStatus.is_in(selectable_statuses()))
            .order_by_asc(promotion_post::Column::AnalyzedAt)
            .order_by_asc(promotion_post::Column::Id)
            .limit(self.config.batch_size)
            .all(self.storage.get_db())
            .await?)
    }

    pub async fn settle_pending_posts(&self) -> Result<SettlementReport> {
        let stale_recovered = self.recover_stale_processing(Utc::now()).await?;
        let posts = self.eligible_posts().await?;
        let mut report = SettlementReport {
            selected: posts.len(),
            stale_recovered,
            ..Default::default()
        };

        for post in posts {
            let outcome = self.settle_post(&post.id).await?;
            debug!("Settlement of post {}: {:?}", post.id, outcome);
            report.record(&outcome);
        }

        if report.selected > 0 || report.stale_recovered > 0 {
            info!(
                "Settlement: {} paid ({:.2} IDR), {} zero, {} rejected, {} errors, {} skipped",
                report.paid,
                report.total_paid_idr,
                report.zero_payout,
                report.rejected,
                report.errors,
                report.skipped
            );
        }
        Ok(report)
    }

    /// 结算单个帖子；对已结算帖子重复调用是无操作
    pub async fn settle_post(&self, post_id: &str) -> Result<PostSettlement> {
        let Some(post) = self.storage.find_post(post_id).await? else {
            return Err(PromoGuardError::not_found(format!(
                "Promotion post {} not found",
                post_id
            )));
        };

        let status = SettlementStatus::from_str(&post.settlement_status).map_err(|_| {
            PromoGuardError::validation(format!(
                "Post {} has unknown settlement status '{}'",
                post.id, post.settlement_status
            ))
        })?;
        if matches!(
            status,
            SettlementStatus::Paid
                | SettlementStatus::PayoutProcessing
                | SettlementStatus::PayoutRejected
        ) {
            return Ok(PostSettlement::AlreadySettled(status));
        }
        if !status.is_selectable() {
            return Ok(PostSettlement::NotEligible(format!(
                "settlement status {} requires manual review",
                status
            )));
        }
        if post.bot_analysis_status != BotAnalysisStatus::Normal.as_str()
            || post.fetch_status != FetchStatus::FetchedSuccess.as_str()
        {
            return Ok(PostSettlement::NotEligible(format!(
                "analysis {} / fetch {}",
                post.bot_analysis_status, post.fetch_status
            )));
        }

        let now = Utc::now();

        // 关联数据
        let Some(promotion) = self.storage.find_promotion(&post.promotion_id).await? else {
            let reason = format!("Promotion {} not found", post.promotion_id);
            return self.mark_data_error(&post, reason, now).await;
        };
        if promotion.status != PromotionStatus::Approved.as_str() {
            return Ok(PostSettlement::NotEligible(format!(
                "promotion status {}",
                promotion.status
            )));
        }
        let Some(campaign) = self.storage.find_campaign(&promotion.campaign_id).await? else {
            let reason = format!("Campaign {} not found", promotion.campaign_id);
            return self.mark_data_error(&post, reason, now).await;
        };
        let Some(promoter) = self.storage.find_user(&promotion.promoter_id).await? else {
            let reason = format!("Promoter {} not found", promotion.promoter_id);
            return self.mark_data_error(&post, reason, now).await;
        };
        let Some(snapshot) = self.storage.latest_snapshot(&post.id).await? else {
            return self
                .mark_data_error(&post, "No metric snapshot available".to_string(), now)
                .await;
        };

        if promoter.status != UserStatus::Active.as_str() {
            let reason = format!("Promoter status is {}.", promoter.status);
            self.storage
                .update_post(promotion_post::ActiveModel {
                    id: Unchanged(post.id.clone()),
                    settlement_status: Set(SettlementStatus::PayoutRejected.as_str().to_string()),
                    error_message: Set(Some(truncate_reason(&reason))),
                    updated_at: Set(now),
                    ..Default::default()
                })
                .await?;
            warn!("Payout for post {} rejected: {}", post.id, reason);
            return Ok(PostSettlement::Rejected(reason));
        }

        if !self.acquire(&post.id, now).await? {
            return Ok(PostSettlement::LeaseLost);
        }

        let amount = self.formula.amount(&snapshot, campaign.rate_per_viewer_idr);

        if amount < self.min_payout() {
            let completed = self
                .storage
                .update_post(promotion_post::ActiveModel {
                    id: Unchanged(post.id.clone()),
                    settlement_status: Set(SettlementStatus::Paid.as_str().to_string()),
                    calculated_earnings_idr: Set(0.0),
                    payout_transaction_id: Set(None),
                    error_message: Set(None),
                    updated_at: Set(now),
                    ..Default::default()
                })
                .await;
            if let Err(e) = completed {
                let reason = truncate_reason(&format!("Zero payout completion failed: {}", e));
                error!("Settlement of post {} failed: {}", post.id, e);
                self.release_with_tx_error(&post.id, &reason).await?;
                return Ok(PostSettlement::TxError(reason));
            }
            info!(
                "Post {} settled with zero payout (views={})",
                post.id, snapshot.views
            );
            return Ok(PostSettlement::ZeroPayout);
        }

        let earning = Earning {
            user_id: &promoter.id,
            amount_idr: amount,
            reference_id: &post.id,
            reference_type: ReferenceType::PromotionPost,
            description: format!(
                "Earning for {} post ({} views) in campaign '{}'",
                post.platform, snapshot.views, campaign.title
            ),
        };

        match self.commit_payout(&post, &promotion.id, &earning, now).await {
            Ok(transaction_id) => {
                info!(
                    "Paid {:.2} IDR to {} for post {} (tx {})",
                    amount, promoter.id, post.id, transaction_id
                );
                Ok(PostSettlement::Paid {
                    transaction_id,
                    amount_idr: amount,
                })
            }
            Err(e) => {
                let reason = truncate_reason(&format!("Payout transaction failed: {}", e));
                error!("Settlement of post {} failed: {}", post.id, e);
                self.release_with_tx_error(&post.id, &reason).await?;
                Ok(PostSettlement::TxError(reason))
            }
        }
    }

    /// 领取 PAYOUT_PROCESSING；同时复核分析结论仍为 NORMAL
    async fn acquire(&self, post_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let result = promotion_post::Entity::update_many()
            .col_expr(
                promotion_post::Column::SettlementStatus,
                Expr::value(SettlementStatus::PayoutProcessing.as_str()),
            )
            .col_expr(promotion_post::Column::UpdatedAt, Expr::value(now))
            .filter(promotion_post::Column::Id.eq(post_id))
            .filter(promotion_post::Column::SettlementStatus.is_in(selectable_statuses()))
            .filter(
                promotion_post::Column::BotAnalysisStatus.eq(BotAnalysisStatus::Normal.as_str()),
            )
            .exec(self.storage.get_db())
            .await?;
        Ok(result.rows_affected == 1)
    }

    /// 把仍由本引擎持有的 PAYOUT_PROCESSING 租约转为 PAYOUT_ERROR_TX
    ///
    /// 这里失败时帖子留在 PAYOUT_PROCESSING，由过期扫描兜底。
    async fn release_with_tx_error(&self, post_id: &str, reason: &str) -> Result<()> {
        let db = self.storage.get_db();
        let now = Utc::now();
        retry::with_retry(
            &format!("payout_error_tx({})", post_id),
            self.storage.retry_config(),
            || {
                promotion_post::Entity::update_many()
                    .col_expr(
                        promotion_post::Column::SettlementStatus,
                        Expr::value(SettlementStatus::PayoutErrorTx.as_str()),
                    )
                    .col_expr(
                        promotion_post::Column::ErrorMessage,
                        Expr::value(reason.to_string()),
                    )
                    .col_expr(promotion_post::Column::UpdatedAt, Expr::value(now))
                    .filter(promotion_post::Column::Id.eq(post_id))
                    .filter(
                        promotion_post::Column::SettlementStatus
                            .eq(SettlementStatus::PayoutProcessing.as_str()),
                    )
                    .exec(db)
            },
        )
        .await?;
        Ok(())
    }

    /// PAYOUT_PROCESSING 超过 `stale_processing_minutes` 视为中断，转为 PAYOUT_ERROR_TX
    ///
    /// 入账事务与 PAID 标记在同一事务内提交，仍停在 PAYOUT_PROCESSING
    /// 说明事务未提交，余额未变。
    pub async fn recover_stale_processing(&self, now: DateTime<Utc>) -> Result<u64> {
        let stale_before = now - Duration::minutes(self.config.stale_processing_minutes);
        let db = self.storage.get_db();
        let reason = truncate_reason(&format!(
            "Settlement interrupted: PAYOUT_PROCESSING lease older than {} minutes",
            self.config.stale_processing_minutes
        ));

        let result = retry::with_retry("recover_stale_payouts", self.storage.retry_config(), || {
            promotion_post::Entity::update_many()
                .col_expr(
                    promotion_post::Column::SettlementStatus,
                    Expr::value(SettlementStatus::PayoutErrorTx.as_str()),
                )
                .col_expr(
                    promotion_post::Column::ErrorMessage,
                    Expr::value(reason.clone()),
                )
                .col_expr(promotion_post::Column::UpdatedAt, Expr::value(now))
                .filter(
                    promotion_post::Column::SettlementStatus
                        .eq(SettlementStatus::PayoutProcessing.as_str()),
                )
                .filter(promotion_post::Column::UpdatedAt.lte(stale_before))
                .exec(db)
        })
        .await?;

        if result.rows_affected > 0 {
            warn!(
                "Moved {} interrupted payouts to PAYOUT_ERROR_TX",
                result.rows_affected
            );
        }
        Ok(result.rows_affected)
    }

    async fn commit_payout(
        &self,
        post: &promotion_post::Model,
        promotion_id: &str,
        earning: &Earning<'_>,
        now: DateTime<Utc>,
    ) -> std::result::Result<String, DbErr> {
        let txn = self.storage.get_db().begin().await?;

        let (transaction_id, created) = credit_earning(&txn, earning, now).await?;

        promotion_post::Entity::update(promotion_post::ActiveModel {
            id: Unchanged(post.id.clone()),
            settlement_status: Set(SettlementStatus::Paid.as_str().to_string()),
            payout_transaction_id: Set(Some(transaction_id.clone())),
            calculated_earnings_idr: Set(earning.amount_idr),
            error_message: Set(None),
            updated_at: Set(now),
            ..Default::default()
        })
        .exec(&txn)
        .await?;

        if created {
            promotion::Entity::update_many()
                .col_expr(
                    promotion::Column::CalculatedEarningsIdr,
                    Expr::col(promotion::Column::CalculatedEarningsIdr).add(earning.amount_idr),
                )
                .col_expr(promotion::Column::UpdatedAt, Expr::value(now))
                .filter(promotion::Column::Id.eq(promotion_id))
                .exec(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(transaction_id)
    }

    async fn mark_data_error(
        &self,
        post: &promotion_post::Model,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<PostSettlement> {
        self.storage
            .update_post(promotion_post::ActiveModel {
                id: Unchanged(post.id.clone()),
                settlement_status: Set(SettlementStatus::PayoutErrorData.as_str().to_string()),
                error_message: Set(Some(truncate_reason(&reason))),
                updated_at: Set(now),
                ..Default::default()
            })
            .await?;
        warn!("Post {} cannot be settled: {}", post.id, reason);
        Ok(PostSettlement::DataError(reason))
    }
}

fn selectable_statuses() -> [&'static str; 2] {
    [
        SettlementStatus::Unpaid.as_str(),
        SettlementStatus::PayoutErrorData.as_str(),
    ]
}
