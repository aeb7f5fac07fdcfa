//! 指标抓取消费者
//!
//! 状态机：`NOT_FETCHED → FETCHING → {FETCHED_SUCCESS | FETCHED_ERROR_*}`，
//! `FETCHED_ERROR_AUTH` 与 `SUBMIT_INVALID_URL` 为终态。
//! 数据库错误向上传播，由队列 nack 后重投。

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::ActiveValue::{Set, Unchanged};
use tracing::{debug, info, warn};

use super::queue::{HarvestMessage, HarvestQueue};
use crate::config::{HarvesterConfig, PlatformsConfig, SchedulerConfig};
use crate::errors::Result;
use crate::platforms::{AdapterRegistry, Credential, FetchError, PostRef, post_url};
use crate::storage::SeaOrmStorage;
use crate::storage::models::{BotAnalysisStatus, FetchStatus, SettlementStatus, SocialPlatform};
use crate::utils::truncate_reason;
use migration::entities::promotion_post;

/// 单条消息的处理结果（均可 ack）
#[derive(Debug, Clone, PartialEq)]
pub enum HarvestOutcome {
    /// 帖子或推广不存在
    Skipped(String),
    Fetched { snapshot_id: i64, views: i64 },
    Failed { status: FetchStatus, reason: String },
}

/// 一轮消费的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub received: usize,
    pub acked: usize,
    pub nacked: usize,
}

/// 抓取完成后 `next_check_at` 的推进策略
#[derive(Debug, Clone)]
pub struct HarvestPolicy {
    pub freshness: Duration,
    pub retry_window: Duration,
    pub max_backoff: Duration,
    /// 无 OAuth 凭证时 YouTube 使用的 API key
    pub youtube_api_key: Option<String>,
}

impl HarvestPolicy {
    pub fn from_config(scheduler: &SchedulerConfig, platforms: &PlatformsConfig) -> Self {
        Self {
            freshness: Duration::hours(scheduler.freshness_hours),
            retry_window: Duration::minutes(scheduler.retry_window_minutes),
            max_backoff: Duration::hours(scheduler.max_backoff_hours),
            youtube_api_key: platforms
                .youtube_api_key
                .clone()
                .filter(|k| !k.trim().is_empty()),
        }
    }

    /// `retry_window · 2^(failures-1)`，上限 `max_backoff`
    pub fn backoff(&self, failures: i32) -> Duration {
        let exponent = failures.saturating_sub(1).clamp(0, 16) as u32;
        let delay = self
            .retry_window
            .checked_mul(2i32.pow(exponent))
            .unwrap_or(self.max_backoff);
        delay.min(self.max_backoff)
    }
}

impl Default for HarvestPolicy {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default(), &PlatformsConfig::default())
    }
}

pub struct MetricHarvester {
    storage: Arc<SeaOrmStorage>,
    registry: Arc<AdapterRegistry>,
    policy: HarvestPolicy,
}

impl MetricHarvester {
    pub fn new(
        storage: Arc<SeaOrmStorage>,
        registry: Arc<AdapterRegistry>,
        policy: HarvestPolicy,
    ) -> Self {
        Self {
            storage,
            registry,
            policy,
        }
    }

    /// 处理一条抓取请求
    pub async fn handle(&self, message: &HarvestMessage) -> Result<HarvestOutcome> {
        let now = Utc::now();
        let post_id = message.promotion_post_id.as_str();

        let Some(post) = self.storage.find_post(post_id).await? else {
            warn!("Harvest request for unknown post {}, dropping", post_id);
            return Ok(HarvestOutcome::Skipped(format!("post {} not found", post_id)));
        };

        let Some(promotion) = self.storage.find_promotion(&post.promotion_id).await? else {
            warn!(
                "Post {} references missing promotion {}, dropping",
                post_id, post.promotion_id
            );
            return Ok(HarvestOutcome::Skipped(format!(
                "promotion {} not found",
                post.promotion_id
            )));
        };

        let platform = match SocialPlatform::from_str(&post.platform) {
            Ok(p) => p,
            Err(_) => {
                let err = FetchError::Api {
                    status: None,
                    message: format!("unsupported platform '{}'", post.platform),
                };
                return self.record_failure(&post, err, now).await;
            }
        };

        let credential = match self
            .resolve_credential(&promotion.promoter_id, platform, now)
            .await?
        {
            Ok(c) => c,
            Err(err) => return self.record_failure(&post, err, now).await,
        };

        // 领取：FETCHING + last_checked_at
        self.storage
            .update_post(promotion_post::ActiveModel {
                id: Unchanged(post.id.clone()),
                fetch_status: Set(FetchStatus::Fetching.as_str().to_string()),
                last_checked_at: Set(Some(now)),
                error_message: Set(None),
                updated_at: Set(now),
                ..Default::default()
            })
            .await?;

        let external_id = post
            .external_post_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .or_else(|| post_url::extract_post_id(platform, &post.post_url));
        let Some(external_id) = external_id else {
            return self
                .record_failure(&post, FetchError::InvalidPostRef(post.post_url.clone()), now)
                .await;
        };

        let post_ref = PostRef {
            external_id: external_id.clone(),
            url: post.post_url.clone(),
        };

        match self.registry.fetch(platform, &post_ref, &credential).await {
            Ok(metrics) => {
                let fetched_at = Utc::now();
                let snapshot_id = self
                    .storage
                    .append_snapshot(&post.id, &metrics, fetched_at)
                    .await?;

                let mut changes = promotion_post::ActiveModel {
                    id: Unchanged(post.id.clone()),
                    fetch_status: Set(FetchStatus::FetchedSuccess.as_str().to_string()),
                    error_message: Set(None),
                    consecutive_failures: Set(0),
                    next_check_at: Set(Some(now + self.policy.freshness)),
                    updated_at: Set(fetched_at),
                    ..Default::default()
                };
                if post.external_post_id.as_deref() != Some(external_id.as_str()) {
                    changes.external_post_id = Set(Some(external_id));
                }
                if needs_reanalysis(&post) {
                    changes.bot_analysis_status =
                        Set(BotAnalysisStatus::AnalyzingPending.as_str().to_string());
                }
                self.storage.update_post(changes).await?;

                info!(
                    "Harvested {} post {}: views={} likes={} comments={}",
                    platform, post.id, metrics.views, metrics.likes, metrics.comments
                );
                Ok(HarvestOutcome::Fetched {
                    snapshot_id,
                    views: metrics.views,
                })
            }
            Err(err) => self.record_failure(&post, err, now).await,
        }
    }

    /// 最新凭证；缺失或过期时 YouTube 可退回到 API key
    async fn resolve_credential(
        &self,
        promoter_id: &str,
        platform: SocialPlatform,
        now: DateTime<Utc>,
    ) -> Result<std::result::Result<Credential, FetchError>> {
        let stored = self.storage.latest_credential(promoter_id, platform).await?;

        let problem = match stored {
            Some(cred) => match cred.access_token.filter(|t| !t.is_empty()) {
                Some(_) if cred.expires_at.is_some_and(|exp| exp <= now) => {
                    format!("{} credential expired", platform.provider())
                }
                Some(token) => return Ok(Ok(Credential::OAuth(token))),
                None => format!("{} credential has no access token", platform.provider()),
            },
            None => format!("no {} credential for promoter", platform.provider()),
        };

        if platform == SocialPlatform::Youtube
            && let Some(key) = &self.policy.youtube_api_key
        {
            debug!("Using YouTube API key fallback: {}", problem);
            return Ok(Ok(Credential::ApiKey(key.clone())));
        }

        Ok(Err(FetchError::Auth(problem)))
    }

    async fn record_failure(
        &self,
        post: &promotion_post::Model,
        err: FetchError,
        now: DateTime<Utc>,
    ) -> Result<HarvestOutcome> {
        let status = err.fetch_status();
        let reason = truncate_reason(&err.to_string());
        let failures = post.consecutive_failures.saturating_add(1);

        let next_check_at = if status.is_terminal() {
            None
        } else {
            Some(now + self.policy.backoff(failures))
        };

        self.storage
            .update_post(promotion_post::ActiveModel {
                id: Unchanged(post.id.clone()),
                fetch_status: Set(status.as_str().to_string()),
                error_message: Set(Some(reason.clone())),
                consecutive_failures: Set(failures),
                next_check_at: Set(next_check_at),
                updated_at: Set(now),
                ..Default::default()
            })
            .await?;

        warn!(
            "Harvest of post {} failed with {} (failure #{}): {}",
            post.id, status, failures, reason
        );
        Ok(HarvestOutcome::Failed { status, reason })
    }

    /// 领取一批消息并处理：成功 ack，数据库错误 nack
    pub async fn drain_once(
        &self,
        queue: &dyn HarvestQueue,
        config: &HarvesterConfig,
    ) -> Result<DrainReport> {
        let deliveries = queue
            .receive(
                config.receive_batch,
                Duration::seconds(config.visibility_timeout_secs),
            )
            .await?;

        let mut report = DrainReport {
            received: deliveries.len(),
            ..Default::default()
        };

        for delivery in &deliveries {
            match self.handle(&delivery.message).await {
                Ok(outcome) => {
                    debug!("Harvest message {} handled: {:?}", delivery.id, outcome);
                    queue.ack(delivery).await?;
                    report.acked += 1;
                }
                Err(e) => {
                    warn!(
                        "Harvest message {} (attempt {}) failed: {}",
                        delivery.id, delivery.attempts, e
                    );
                    queue
                        .nack(
                            delivery,
                            Duration::seconds(config.nack_delay_secs),
                            &e.to_string(),
                        )
                        .await?;
                    report.nacked += 1;
                }
            }
        }

        Ok(report)
    }
}

/// 新快照落地后是否需要重新分析：已结算或结算中的帖子不再动
fn needs_reanalysis(post: &promotion_post::Model) -> bool {
    let settled = SettlementStatus::from_str(&post.settlement_status).is_ok_and(|s| {
        matches!(
            s,
            SettlementStatus::Paid
                | SettlementStatus::PayoutProcessing
                | SettlementStatus::PayoutRejected
        )
    });
    !settled && post.bot_analysis_status != BotAnalysisStatus::AnalyzingPending.as_str()
}
