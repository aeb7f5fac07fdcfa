//! Query operations for SeaOrmStorage
//!
//! Read-only lookups shared by the pipeline stages.

use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder};

use super::{SeaOrmStorage, retry};
use crate::errors::Result;
use crate::storage::models::{SocialPlatform, ThresholdMetric};

use migration::entities::{
    bot_threshold, campaign, platform_credential, platform_metric_snapshot, promotion,
    promotion_post, user,
};

/// 帖子级规则使用的两类阈值
#[derive(Debug, Clone, Default)]
pub struct PostThresholds {
    pub like_view_ratio: Option<bot_threshold::Model>,
    pub daily_view_increase: Option<bot_threshold::Model>,
}

impl SeaOrmStorage {
    pub async fn find_post(&self, post_id: &str) -> Result<Option<promotion_post::Model>> {
        let db = &self.db;
        let post = retry::with_retry(&format!("find_post({})", post_id), self.retry_config, || {
            promotion_post::Entity::find_by_id(post_id.to_string()).one(db)
        })
        .await?;
        Ok(post)
    }

    pub async fn find_promotion(&self, promotion_id: &str) -> Result<Option<promotion::Model>> {
        Ok(promotion::Entity::find_by_id(promotion_id.to_string())
            .one(&self.db)
            .await?)
    }

    pub async fn find_campaign(&self, campaign_id: &str) -> Result<Option<campaign::Model>> {
        Ok(campaign::Entity::find_by_id(campaign_id.to_string())
            .one(&self.db)
            .await?)
    }

    pub async fn find_user(&self, user_id: &str) -> Result<Option<user::Model>> {
        Ok(user::Entity::find_by_id(user_id.to_string())
            .one(&self.db)
            .await?)
    }

    /// 最新的一条平台凭证（同一用户同一平台可能有多条）
    pub async fn latest_credential(
        &self,
        user_id: &str,
        platform: SocialPlatform,
    ) -> Result<Option<platform_credential::Model>> {
        Ok(platform_credential::Entity::find()
            .filter(platform_credential::Column::UserId.eq(user_id))
            .filter(platform_credential::Column::Provider.eq(platform.provider()))
            .order_by_desc(platform_credential::Column::CreatedAt)
            .one(&self.db)
            .await?)
    }

    /// 帖子的完整快照序列，按 fetched_at 升序
    ///
    /// 重投可能产生乱序或重复快照，调用方仍应自行排序后再计算差值。
    pub async fn load_snapshots(
        &self,
        post_id: &str,
    ) -> Result<Vec<platform_metric_snapshot::Model>> {
        Ok(platform_metric_snapshot::Entity::find()
            .filter(platform_metric_snapshot::Column::PromotionPostId.eq(post_id))
            .order_by_asc(platform_metric_snapshot::Column::FetchedAt)
            .order_by_asc(platform_metric_snapshot::Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn latest_snapshot(
        &self,
        post_id: &str,
    ) -> Result<Option<platform_metric_snapshot::Model>> {
        Ok(platform_metric_snapshot::Entity::find()
            .filter(platform_metric_snapshot::Column::PromotionPostId.eq(post_id))
            .order_by_desc(platform_metric_snapshot::Column::FetchedAt)
            .order_by_desc(platform_metric_snapshot::Column::Id)
            .one(&self.db)
            .await?)
    }

    /// 按名称取当前生效的阈值
    pub async fn active_threshold(&self, name: &str) -> Result<Option<bot_threshold::Model>> {
        Ok(bot_threshold::Entity::find()
            .filter(bot_threshold::Column::Name.eq(name))
            .filter(bot_threshold::Column::IsActive.eq(true))
            .order_by_desc(bot_threshold::Column::Version)
            .one(&self.db)
            .await?)
    }

    /// 帖子级阈值：平台专属的优先于通用的
    pub async fn post_thresholds(&self, platform: SocialPlatform) -> Result<PostThresholds> {
        let rows = bot_threshold::Entity::find()
            .filter(bot_threshold::Column::IsActive.eq(true))
            .filter(bot_threshold::Column::MetricType.is_in([
                ThresholdMetric::LikeViewRatio.as_str(),
                ThresholdMetric::DailyViewIncrease.as_str(),
            ]))
            .filter(
                Condition::any()
                    .add(bot_threshold::Column::Platform.is_null())
                    .add(bot_threshold::Column::Platform.eq(platform.as_str())),
            )
            .order_by_desc(bot_threshold::Column::UpdatedAt)
            .all(&self.db)
            .await?;

        let pick = |metric: ThresholdMetric| {
            let metric_rows = || {
                rows.iter()
                    .filter(move |t| t.metric_type.as_deref() == Some(metric.as_str()))
            };
            metric_rows()
                .find(|t| t.platform.is_some())
                .or_else(|| metric_rows().next())
                .cloned()
        };

        Ok(PostThresholds {
            like_view_ratio: pick(ThresholdMetric::LikeViewRatio),
            daily_view_increase: pick(ThresholdMetric::DailyViewIncrease),
        })
    }
}
