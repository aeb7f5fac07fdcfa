//! 抓取调度器
//!
//! 定时扫描需要刷新指标的帖子并入队，本身不调用平台 API。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ColumnTrait, Condition, EntityTrait, Order, QueryFilter, QueryOrder, QuerySelect,
    sea_query::{Expr, NullOrdering},
};
use tracing::{debug, info};

use super::queue::{HarvestMessage, HarvestQueue, MAX_SEND_BATCH};
use crate::config::SchedulerConfig;
use crate::errors::Result;
use crate::storage::SeaOrmStorage;
use crate::storage::backend::retry;
use crate::storage::models::FetchStatus;
use migration::entities::{promotion, promotion_post};

/// 一次调度扫描的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleReport {
    pub scanned: usize,
    pub enqueued: usize,
}

pub struct HarvestScheduler {
    storage: Arc<SeaOrmStorage>,
    queue: Arc<dyn HarvestQueue>,
    config: SchedulerConfig,
}

impl HarvestScheduler {
    pub fn new(
        storage: Arc<SeaOrmStorage>,
        queue: Arc<dyn HarvestQueue>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            storage,
            queue,
            config,
        }
    }

    /// 选出到期的帖子
    ///
    /// - 所属推广处于活跃状态
    /// - 抓取状态不是终态；FETCHING 仅在租约过期后重新调度
    /// - `next_check_at` 为空或已到期
    pub async fn due_posts(&self, now: DateTime<Utc>) -> Result<Vec<promotion_post::Model>> {
        let stale_before = now - Duration::minutes(self.config.stale_fetching_minutes);

        let not_in_flight = Condition::any()
            .add(promotion_post::Column::FetchStatus.ne(FetchStatus::Fetching.as_str()))
            .add(promotion_post::Column::LastCheckedAt.is_null())
            .add(promotion_post::Column::LastCheckedAt.lte(stale_before));

        let due = Condition::any()
            .add(promotion_post::Column::NextCheckAt.is_null())
            .add(promotion_post::Column::NextCheckAt.lte(now));

        let posts = promotion_post::Entity::find()
            .inner_join(promotion::Entity)
            .filter(promotion::Column::Status.is_in(self.config.active_promotion_statuses.clone()))
            .filter(promotion_post::Column::FetchStatus.is_not_in([
                FetchStatus::FetchedErrorAuth.as_str(),
                FetchStatus::SubmitInvalidUrl.as_str(),
            ]))
            .filter(not_in_flight)
            .filter(due)
            .order_by_with_nulls(
                promotion_post::Column::LastCheckedAt,
                Order::Asc,
                NullOrdering::First,
            )
            .order_by_with_nulls(
                promotion_post::Column::NextCheckAt,
                Order::Asc,
                NullOrdering::First,
            )
            .order_by_asc(promotion_post::Column::SubmittedAt)
            .limit(self.config.batch_size)
            .all(self.storage.get_db())
            .await?;

        Ok(posts)
    }

    /// 扫描并入队；入队后立即把 `next_check_at` 推到冷却期之后
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<ScheduleReport> {
        let posts = self.due_posts(now).await?;
        let mut report = ScheduleReport {
            scanned: posts.len(),
            enqueued: 0,
        };

        if posts.is_empty() {
            debug!("Harvest scheduler: no posts due");
            return Ok(report);
        }

        let cooldown_until = now + Duration::minutes(self.config.cooldown_minutes);
        let db = self.storage.get_db();

        for chunk in posts.chunks(MAX_SEND_BATCH) {
            let messages: Vec<HarvestMessage> = chunk
                .iter()
                .map(|p| HarvestMessage::new(p.id.clone()))
                .collect();
            report.enqueued += self.queue.send_batch(&messages).await?;

            let ids: Vec<String> = chunk.iter().map(|p| p.id.clone()).collect();
            retry::with_retry("scheduler_cooldown", self.storage.retry_config(), || {
                promotion_post::Entity::update_many()
                    .col_expr(
                        promotion_post::Column::NextCheckAt,
                        Expr::value(cooldown_until),
                    )
                    .filter(promotion_post::Column::Id.is_in(ids.clone()))
                    .exec(db)
            })
            .await?;
        }

        info!(
            "Harvest scheduler enqueued {} of {} due posts",
            report.enqueued, report.scanned
        );
        Ok(report)
    }
}
