//! Mutation operations for SeaOrmStorage
//!
//! Writes that more than one stage performs. Stage-specific state
//! transitions live next to the stage that owns them.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait};
use tracing::debug;

use super::{SeaOrmStorage, retry};
use crate::errors::Result;
use crate::platforms::PlatformMetrics;

use migration::entities::{platform_metric_snapshot, promotion_post};

impl SeaOrmStorage {
    /// 追加一条快照（只插入，从不更新）
    pub async fn append_snapshot(
        &self,
        post_id: &str,
        metrics: &PlatformMetrics,
        fetched_at: DateTime<Utc>,
    ) -> Result<i64> {
        let model = platform_metric_snapshot::ActiveModel {
            promotion_post_id: Set(post_id.to_string()),
            fetched_at: Set(fetched_at),
            views: Set(metrics.views),
            likes: Set(metrics.likes),
            comments: Set(metrics.comments),
            shares: Set(metrics.shares),
            raw_payload: Set(metrics.raw_payload.as_ref().map(|v| v.to_string())),
            ..Default::default()
        };

        let result = platform_metric_snapshot::Entity::insert(model)
            .exec(&self.db)
            .await?;

        debug!(
            "Snapshot {} appended for post {} (views={})",
            result.last_insert_id, post_id, metrics.views
        );
        Ok(result.last_insert_id)
    }

    /// 按主键部分更新帖子（未 Set 的列保持不变），可重试
    pub async fn update_post(&self, changes: promotion_post::ActiveModel) -> Result<()> {
        let db = &self.db;
        retry::with_retry("update_post", self.retry_config, || {
            let changes = changes.clone();
            async move { changes.update(db).await }
        })
        .await?;
        Ok(())
    }
}
