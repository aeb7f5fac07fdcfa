//! 抓取请求队列
//!
//! 至少一次投递语义：领取时写入可见性超时，消费者 ack 后删除可见性；
//! nack 或租约过期后重新投递，超过 `max_deliveries` 进入死信。
//! 已完成与死信消息按保留期由 [`HarvestQueue::purge`] 分批删除。

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, Condition, EntityTrait, ExprTrait, QueryFilter, QueryOrder,
    QuerySelect, sea_query::Expr,
};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};
use tracing::{debug, warn};

use crate::errors::{PromoGuardError, Result};
use crate::storage::SeaOrmStorage;
use crate::storage::backend::retry;
use crate::utils::truncate_reason;
use migration::entities::harvest_queue;

/// 单次 send_batch 的最大消息数
pub const MAX_SEND_BATCH: usize = 100;

/// 清理时每批删除的行数
const PURGE_BATCH_SIZE: u64 = 1000;

/// 单次清理的最大批次数，防止无限循环
const PURGE_MAX_ITERATIONS: usize = 1000;

/// 队列消息体：`{"promotionPostId": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestMessage {
    pub promotion_post_id: String,
}

impl HarvestMessage {
    pub fn new(promotion_post_id: impl Into<String>) -> Self {
        Self {
            promotion_post_id: promotion_post_id.into(),
        }
    }
}

/// 一次投递
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: i64,
    pub message: HarvestMessage,
    /// 包含本次在内的投递次数
    pub attempts: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    Pending,
    Leased,
    Done,
    Dead,
}

impl QueueStatus {
    fn as_str(self) -> &'static str {
        self.into()
    }
}

#[async_trait]
pub trait HarvestQueue: Send + Sync {
    /// 入队，返回写入条数
    async fn send_batch(&self, messages: &[HarvestMessage]) -> Result<usize>;

    /// 领取最多 `max` 条可见消息，并隐藏 `visibility_timeout`
    async fn receive(&self, max: u64, visibility_timeout: Duration) -> Result<Vec<Delivery>>;

    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// 处理失败：延迟后重投，投递次数用尽则进入死信
    async fn nack(&self, delivery: &Delivery, delay: Duration, error: &str) -> Result<()>;

    /// 删除 `done_before` 之前完成的消息和 `dead_before` 之前死信的消息
    async fn purge(&self, done_before: DateTime<Utc>, dead_before: DateTime<Utc>) -> Result<u64>;
}

// ============================================================
// Database-backed queue
// ============================================================

pub struct DbHarvestQueue {
    storage: Arc<SeaOrmStorage>,
    max_deliveries: i32,
}

impl DbHarvestQueue {
    pub fn new(storage: Arc<SeaOrmStorage>, max_deliveries: i32) -> Self {
        Self {
            storage,
            max_deliveries,
        }
    }

    /// 尚未完成的消息数（PENDING + LEASED）
    pub async fn backlog(&self) -> Result<u64> {
        use sea_orm::PaginatorTrait;
        Ok(harvest_queue::Entity::find()
            .filter(harvest_queue::Column::Status.is_in([
                QueueStatus::Pending.as_str(),
                QueueStatus::Leased.as_str(),
            ]))
            .count(self.storage.get_db())
            .await?)
    }

    async fn mark(
        &self,
        id: i64,
        status: QueueStatus,
        available_at: DateTime<Utc>,
        error: Option<String>,
    ) -> Result<()> {
        let db = self.storage.get_db();
        let now = Utc::now();
        retry::with_retry(
            &format!("queue_mark_{}", status.as_str().to_lowercase()),
            self.storage.retry_config(),
            || {
                let error = error.clone();
                async move {
                    harvest_queue::Entity::update_many()
                        .col_expr(harvest_queue::Column::Status, Expr::value(status.as_str()))
                        .col_expr(harvest_queue::Column::AvailableAt, Expr::value(available_at))
                        .col_expr(harvest_queue::Column::LastError, Expr::value(error))
                        .col_expr(harvest_queue::Column::UpdatedAt, Expr::value(now))
                        .filter(harvest_queue::Column::Id.eq(id))
                        .exec(db)
                        .await
                }
            },
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl HarvestQueue for DbHarvestQueue {
    async fn send_batch(&self, messages: &[HarvestMessage]) -> Result<usize> {
        if messages.is_empty() {
            return Ok(0);
        }
        if messages.len() > MAX_SEND_BATCH {
            return Err(PromoGuardError::queue(format!(
                "batch of {} exceeds the limit of {}",
                messages.len(),
                MAX_SEND_BATCH
            )));
        }

        let now = Utc::now();
        let mut models = Vec::with_capacity(messages.len());
        for message in messages {
            models.push(harvest_queue::ActiveModel {
                payload: Set(serde_json::to_string(message)?),
                status: Set(QueueStatus::Pending.as_str().to_string()),
                attempts: Set(0),
                available_at: Set(now),
                last_error: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            });
        }

        harvest_queue::Entity::insert_many(models)
            .exec(self.storage.get_db())
            .await?;
        debug!("Enqueued {} harvest messages", messages.len());
        Ok(messages.len())
    }

    async fn receive(&self, max: u64, visibility_timeout: Duration) -> Result<Vec<Delivery>> {
        let db = self.storage.get_db();
        let now = Utc::now();

        let candidates = retry::with_retry("queue_receive", self.storage.retry_config(), || {
            harvest_queue::Entity::find()
                .filter(harvest_queue::Column::Status.is_in([
                    QueueStatus::Pending.as_str(),
                    QueueStatus::Leased.as_str(),
                ]))
                .filter(harvest_queue::Column::AvailableAt.lte(now))
                .order_by_asc(harvest_queue::Column::AvailableAt)
                .order_by_asc(harvest_queue::Column::Id)
                .limit(max)
                .all(db)
        })
        .await?;

        let mut deliveries = Vec::with_capacity(candidates.len());
        for row in candidates {
            // 租约过期但投递次数已用尽
            if row.attempts >= self.max_deliveries {
                warn!(
                    "Harvest message {} exhausted {} deliveries, dead-lettering",
                    row.id, row.attempts
                );
                self.mark(
                    row.id,
                    QueueStatus::Dead,
                    now,
                    Some("lease expired after final delivery".to_string()),
                )
                .await?;
                continue;
            }

            let message: HarvestMessage = match serde_json::from_str(&row.payload) {
                Ok(m) => m,
                Err(e) => {
                    warn!("Harvest message {} has invalid payload: {}", row.id, e);
                    self.mark(
                        row.id,
                        QueueStatus::Dead,
                        now,
                        Some(truncate_reason(&format!("invalid payload: {}", e))),
                    )
                    .await?;
                    continue;
                }
            };

            // 乐观领取：并发消费者中只有一个能匹配旧状态
            let claimed = harvest_queue::Entity::update_many()
                .col_expr(
                    harvest_queue::Column::Status,
                    Expr::value(QueueStatus::Leased.as_str()),
                )
                .col_expr(
                    harvest_queue::Column::Attempts,
                    Expr::col(harvest_queue::Column::Attempts).add(1),
                )
                .col_expr(
                    harvest_queue::Column::AvailableAt,
                    Expr::value(now + visibility_timeout),
                )
                .col_expr(harvest_queue::Column::UpdatedAt, Expr::value(now))
                .filter(
                    Condition::all()
                        .add(harvest_queue::Column::Id.eq(row.id))
                        .add(harvest_queue::Column::Status.eq(row.status.as_str()))
                        .add(harvest_queue::Column::AvailableAt.lte(now)),
                )
                .exec(db)
                .await?;

            if claimed.rows_affected == 1 {
                deliveries.push(Delivery {
                    id: row.id,
                    message,
                    attempts: row.attempts + 1,
                });
            }
        }

        Ok(deliveries)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        self.mark(delivery.id, QueueStatus::Done, Utc::now(), None)
            .await
    }

    async fn nack(&self, delivery: &Delivery, delay: Duration, error: &str) -> Result<()> {
        let reason = Some(truncate_reason(error));
        if delivery.attempts >= self.max_deliveries {
            warn!(
                "Harvest message {} for post {} dead-lettered after {} attempts: {}",
                delivery.id, delivery.message.promotion_post_id, delivery.attempts, error
            );
            self.mark(delivery.id, QueueStatus::Dead, Utc::now(), reason)
                .await
        } else {
            self.mark(
                delivery.id,
                QueueStatus::Pending,
                Utc::now() + delay,
                reason,
            )
            .await
        }
    }

    async fn purge(&self, done_before: DateTime<Utc>, dead_before: DateTime<Utc>) -> Result<u64> {
        let db = self.storage.get_db();
        let expired = Condition::any()
            .add(
                Condition::all()
                    .add(harvest_queue::Column::Status.eq(QueueStatus::Done.as_str()))
                    .add(harvest_queue::Column::UpdatedAt.lt(done_before)),
            )
            .add(
                Condition::all()
                    .add(harvest_queue::Column::Status.eq(QueueStatus::Dead.as_str()))
                    .add(harvest_queue::Column::UpdatedAt.lt(dead_before)),
            );

        let mut total_deleted = 0u64;
        let mut iterations = 0;
        loop {
            if iterations >= PURGE_MAX_ITERATIONS {
                warn!(
                    "Harvest queue purge reached max iterations {} (deleted {} rows)",
                    PURGE_MAX_ITERATIONS, total_deleted
                );
                break;
            }

            let ids: Vec<i64> = harvest_queue::Entity::find()
                .select_only()
                .column(harvest_queue::Column::Id)
                .filter(expired.clone())
                .order_by_asc(harvest_queue::Column::Id)
                .limit(PURGE_BATCH_SIZE)
                .into_tuple()
                .all(db)
                .await?;
            if ids.is_empty() {
                break;
            }

            let deleted = harvest_queue::Entity::delete_many()
                .filter(harvest_queue::Column::Id.is_in(ids))
                .exec(db)
                .await?
                .rows_affected;
            total_deleted += deleted;
            iterations += 1;
            debug!(
                "Harvest queue purge batch {}: deleted {} rows (total {})",
                iterations, deleted, total_deleted
            );

            if deleted < PURGE_BATCH_SIZE {
                break;
            }
        }

        Ok(total_deleted)
    }
}

// ============================================================
// In-memory queue
// ============================================================

#[derive(Debug)]
struct MemoryEntry {
    id: i64,
    message: HarvestMessage,
    attempts: i32,
    available_at: DateTime<Utc>,
    status: QueueStatus,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    entries: VecDeque<MemoryEntry>,
}

/// 进程内队列，用于嵌入式部署与测试
#[derive(Debug)]
pub struct MemoryHarvestQueue {
    state: Mutex<MemoryState>,
    max_deliveries: i32,
}

impl MemoryHarvestQueue {
    pub fn new(max_deliveries: i32) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            max_deliveries,
        }
    }

    /// 未完成且未死信的消息
    pub fn backlog(&self) -> usize {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|e| matches!(e.status, QueueStatus::Pending | QueueStatus::Leased))
            .count()
    }

    pub fn dead_letters(&self) -> Vec<HarvestMessage> {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|e| e.status == QueueStatus::Dead)
            .map(|e| e.message.clone())
            .collect()
    }

    /// 当前所有未完成消息的帖子 ID（入队顺序）
    pub fn pending_post_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|e| matches!(e.status, QueueStatus::Pending | QueueStatus::Leased))
            .map(|e| e.message.promotion_post_id.clone())
            .collect()
    }
}

impl Default for MemoryHarvestQueue {
    fn default() -> Self {
        Self::new(5)
    }
}

#[async_trait]
impl HarvestQueue for MemoryHarvestQueue {
    async fn send_batch(&self, messages: &[HarvestMessage]) -> Result<usize> {
        if messages.len() > MAX_SEND_BATCH {
            return Err(PromoGuardError::queue(format!(
                "batch of {} exceeds the limit of {}",
                messages.len(),
                MAX_SEND_BATCH
            )));
        }
        let now = Utc::now();
        let mut state = self.state.lock();
        for message in messages {
            state.next_id += 1;
            let id = state.next_id;
            state.entries.push_back(MemoryEntry {
                id,
                message: message.clone(),
                attempts: 0,
                available_at: now,
                status: QueueStatus::Pending,
                updated_at: now,
            });
        }
        Ok(messages.len())
    }

    async fn receive(&self, max: u64, visibility_timeout: Duration) -> Result<Vec<Delivery>> {
        let now = Utc::now();
        let max_deliveries = self.max_deliveries;
        let mut state = self.state.lock();
        let mut deliveries = Vec::new();

        for entry in state.entries.iter_mut() {
            if deliveries.len() as u64 >= max {
                break;
            }
            let visible = matches!(entry.status, QueueStatus::Pending | QueueStatus::Leased)
                && entry.available_at <= now;
            if !visible {
                continue;
            }
            entry.updated_at = now;
            if entry.attempts >= max_deliveries {
                entry.status = QueueStatus::Dead;
                continue;
            }
            entry.status = QueueStatus::Leased;
            entry.attempts += 1;
            entry.available_at = now + visibility_timeout;
            deliveries.push(Delivery {
                id: entry.id,
                message: entry.message.clone(),
                attempts: entry.attempts,
            });
        }

        Ok(deliveries)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.iter_mut().find(|e| e.id == delivery.id) {
            entry.status = QueueStatus::Done;
            entry.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, delay: Duration, _error: &str) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.iter_mut().find(|e| e.id == delivery.id) {
            entry.updated_at = Utc::now();
            if delivery.attempts >= self.max_deliveries {
                entry.status = QueueStatus::Dead;
            } else {
                entry.status = QueueStatus::Pending;
                entry.available_at = Utc::now() + delay;
            }
        }
        Ok(())
    }

    async fn purge(&self, done_before: DateTime<Utc>, dead_before: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|e| match e.status {
            QueueStatus::Done => e.updated_at >= done_before,
            QueueStatus::Dead => e.updated_at >= dead_before,
            QueueStatus::Pending | QueueStatus::Leased => true,
        });
        Ok((before - state.entries.len()) as u64)
    }
}
