//! 帖子级分析任务
//!
//! 领取待分析帖子（ANALYZING 租约），加载快照与阈值，写回结论。
//! 每次领取写入新的租约令牌；写回时要求帖子仍处于 ANALYZING 且令牌未变。
//! 期间有新快照落地（被重置为 ANALYZING_PENDING）或被另一 worker 重新领取时，
//! 丢弃本次结论。

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, QuerySelect, sea_query::Expr,
};
use tracing::{debug, info, warn};

use super::post_rules::{PostVerdict, RuleThresholds, SnapshotPoint, analyze_series};
use crate::config::AnalyzerConfig;
use crate::errors::Result;
use crate::storage::SeaOrmStorage;
use crate::storage::backend::retry;
use crate::storage::models::{BotAnalysisStatus, FetchStatus, SocialPlatform};
use crate::utils::truncate_reason;
use migration::entities::promotion_post;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzerReport {
    pub selected: usize,
    pub analyzed: usize,
    pub bot_likely: usize,
    pub suspicious: usize,
    /// 租约被其他 worker 抢走或结论被新快照作废
    pub skipped: usize,
}

pub struct PostAnalyzer {
    storage: Arc<SeaOrmStorage>,
    config: AnalyzerConfig,
}

impl PostAnalyzer {
    pub fn new(storage: Arc<SeaOrmStorage>, config: AnalyzerConfig) -> Self {
        Self { storage, config }
    }

    /// 待分析的帖子：抓取成功，且未分析 / 待重新分析 / 租约过期
    pub async fn pending_posts(&self, now: DateTime<Utc>) -> Result<Vec<promotion_post::Model>> {
        let stale_before = now - Duration::minutes(self.config.stale_analysis_minutes);

        let pending = Condition::any()
            .add(promotion_post::Column::BotAnalysisStatus.is_in([
                BotAnalysisStatus::NotAnalyzed.as_str(),
                BotAnalysisStatus::AnalyzingPending.as_str(),
            ]))
            .add(
                Condition::all()
                    .add(
                        promotion_post::Column::BotAnalysisStatus
                            .eq(BotAnalysisStatus::Analyzing.as_str()),
                    )
                    .add(promotion_post::Column::UpdatedAt.lte(stale_before)),
            );

        Ok(promotion_post::Entity::find()
            .filter(promotion_post::Column::FetchStatus.eq(FetchStatus::FetchedSuccess.as_str()))
            .filter(pending)
            .order_by_asc(promotion_post::Column::UpdatedAt)
            .limit(self.config.batch_size)
            .all(self.storage.get_db())
            .await?)
    }

    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<AnalyzerReport> {
        let posts = self.pending_posts(now).await?;
        let mut report = AnalyzerReport {
            selected: posts.len(),
            ..Default::default()
        };

        for post in posts {
            let Some(lease) = self.acquire(&post, now).await? else {
                debug!("Post {} already taken by another analyzer", post.id);
                report.skipped += 1;
                continue;
            };

            let verdict = self.analyze(&post).await?;
            if !self.persist(&post.id, &lease, &verdict).await? {
                debug!("Post {} re-queued during analysis, result dropped", post.id);
                report.skipped += 1;
                continue;
            }

            match verdict.status {
                BotAnalysisStatus::BotLikely => {
                    report.bot_likely += 1;
                    warn!(
                        "Post {} classified BOT_LIKELY (score {:?}): {}",
                        post.id,
                        verdict.score,
                        verdict.reason()
                    );
                }
                BotAnalysisStatus::Suspicious => report.suspicious += 1,
                _ => {}
            }
            report.analyzed += 1;
        }

        if report.selected > 0 {
            info!(
                "Post analyzer: {} analyzed ({} bot likely, {} suspicious), {} skipped",
                report.analyzed, report.bot_likely, report.suspicious, report.skipped
            );
        }
        Ok(report)
    }

    /// 加载快照与阈值并打分
    pub async fn analyze(&self, post: &promotion_post::Model) -> Result<PostVerdict> {
        let snapshots: Vec<SnapshotPoint> = self
            .storage
            .load_snapshots(&post.id)
            .await?
            .iter()
            .map(SnapshotPoint::from)
            .collect();

        let thresholds = match SocialPlatform::from_str(&post.platform) {
            Ok(platform) => RuleThresholds::from(&self.storage.post_thresholds(platform).await?),
            Err(_) => {
                warn!(
                    "Post {} has unknown platform '{}', analyzing without thresholds",
                    post.id, post.platform
                );
                RuleThresholds::default()
            }
        };

        Ok(analyze_series(&snapshots, &thresholds))
    }

    /// 条件更新领取租约；成功时返回本次租约令牌
    pub async fn acquire(
        &self,
        post: &promotion_post::Model,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let db = self.storage.get_db();
        let lease = uuid::Uuid::new_v4().to_string();
        let mut still_pending = Condition::all().add(
            promotion_post::Column::BotAnalysisStatus.eq(post.bot_analysis_status.as_str()),
        );
        if post.bot_analysis_status == BotAnalysisStatus::Analyzing.as_str() {
            let stale_before = now - Duration::minutes(self.config.stale_analysis_minutes);
            still_pending = still_pending.add(promotion_post::Column::UpdatedAt.lte(stale_before));
        }
        let result = retry::with_retry(
            &format!("analyzer_lease({})", post.id),
            self.storage.retry_config(),
            || {
                promotion_post::Entity::update_many()
                    .col_expr(
                        promotion_post::Column::BotAnalysisStatus,
                        Expr::value(BotAnalysisStatus::Analyzing.as_str()),
                    )
                    .col_expr(
                        promotion_post::Column::AnalysisLease,
                        Expr::value(lease.clone()),
                    )
                    .col_expr(promotion_post::Column::UpdatedAt, Expr::value(now))
                    .filter(promotion_post::Column::Id.eq(post.id.as_str()))
                    .filter(still_pending.clone())
                    .exec(db)
            },
        )
        .await?;
        Ok((result.rows_affected == 1).then_some(lease))
    }

    /// 写回结论并释放租约；租约已被作废或转手时返回 false
    pub async fn persist(&self, post_id: &str, lease: &str, verdict: &PostVerdict) -> Result<bool> {
        let db = self.storage.get_db();
        let now = Utc::now();
        let reason = truncate_reason(&verdict.reason());
        let details = serde_json::to_string(&verdict.details)?;

        let result = retry::with_retry(
            &format!("analyzer_result({})", post_id),
            self.storage.retry_config(),
            || {
                promotion_post::Entity::update_many()
                    .col_expr(
                        promotion_post::Column::BotAnalysisStatus,
                        Expr::value(verdict.status.as_str()),
                    )
                    .col_expr(
                        promotion_post::Column::BotAnalysisReason,
                        Expr::value(reason.clone()),
                    )
                    .col_expr(
                        promotion_post::Column::BotSuspicionScore,
                        Expr::value(verdict.score),
                    )
                    .col_expr(
                        promotion_post::Column::BotAnalysisDetails,
                        Expr::value(details.clone()),
                    )
                    .col_expr(promotion_post::Column::AnalyzedAt, Expr::value(now))
                    .col_expr(
                        promotion_post::Column::AnalysisLease,
                        Expr::value(Option::<String>::None),
                    )
                    .col_expr(promotion_post::Column::UpdatedAt, Expr::value(now))
                    .filter(promotion_post::Column::Id.eq(post_id))
                    .filter(
                        promotion_post::Column::BotAnalysisStatus
                            .eq(BotAnalysisStatus::Analyzing.as_str()),
                    )
                    .filter(promotion_post::Column::AnalysisLease.eq(lease))
                    .exec(db)
            },
        )
        .await?;
        Ok(result.rows_affected == 1)
    }
}
