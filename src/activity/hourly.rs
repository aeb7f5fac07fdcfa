//! 小时汇总：原始日志 → `user_hourly_activity`
//!
//! 每次都从原始日志重新计算，upsert 时覆盖旧值，重复执行结果不变。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QuerySelect, sea_query::OnConflict,
};
use tracing::{debug, info};

use super::{ActivityCounts, MINUTES_PER_HOUR, RollupReport, UPSERT_CHUNK};
use crate::errors::Result;
use crate::storage::SeaOrmStorage;
use crate::storage::backend::retry;
use crate::utils::hour_window;
use migration::entities::{activity_log, user_hourly_activity};

pub struct HourlyActivityRollup {
    storage: Arc<SeaOrmStorage>,
}

impl HourlyActivityRollup {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }

    /// 按用户聚合 `[hour, hour+1h)` 的原始日志
    pub async fn aggregate(&self, hour_start: DateTime<Utc>) -> Result<HashMap<String, ActivityCounts>> {
        let (start, end) = hour_window(hour_start);

        let rows: Vec<(Option<String>, String, i64)> = activity_log::Entity::find()
            .select_only()
            .column(activity_log::Column::UserId)
            .column(activity_log::Column::ActivityType)
            .column_as(activity_log::Column::Id.count(), "count")
            .filter(activity_log::Column::UserId.is_not_null())
            .filter(activity_log::Column::CreatedAt.gte(start))
            .filter(activity_log::Column::CreatedAt.lt(end))
            .group_by(activity_log::Column::UserId)
            .group_by(activity_log::Column::ActivityType)
            .into_tuple()
            .all(self.storage.get_db())
            .await?;

        let mut per_user: HashMap<String, ActivityCounts> = HashMap::new();
        for (user_id, activity_type, count) in rows {
            if let Some(user_id) = user_id {
                per_user
                    .entry(user_id)
                    .or_default()
                    .add(&activity_type, count);
            }
        }
        Ok(per_user)
    }

    pub async fn rollup_hour(&self, hour_start: DateTime<Utc>) -> Result<RollupReport> {
        let (start, _) = hour_window(hour_start);
        let per_user = self.aggregate(start).await?;
        if per_user.is_empty() {
            debug!("No activity to roll up for hour {}", start);
            return Ok(RollupReport::default());
        }

        let now = Utc::now();
        let models: Vec<user_hourly_activity::ActiveModel> = per_user
            .iter()
            .map(|(user_id, counts)| user_hourly_activity::ActiveModel {
                user_id: Set(user_id.clone()),
                hour_start: Set(start),
                total_views: Set(counts.views),
                total_likes: Set(counts.likes),
                total_comments: Set(counts.comments),
                total_activities: Set(counts.total),
                average_activities_per_minute: Set(counts.per_minute(MINUTES_PER_HOUR)),
                updated_at: Set(now),
                ..Default::default()
            })
            .collect();

        let db = self.storage.get_db();
        for chunk in models.chunks(UPSERT_CHUNK) {
            retry::with_retry("upsert_user_hourly", self.storage.retry_config(), || {
                user_hourly_activity::Entity::insert_many(chunk.to_vec())
                    .on_conflict(
                        OnConflict::columns([
                            user_hourly_activity::Column::UserId,
                            user_hourly_activity::Column::HourStart,
                        ])
                        .update_columns([
                            user_hourly_activity::Column::TotalViews,
                            user_hourly_activity::Column::TotalLikes,
                            user_hourly_activity::Column::TotalComments,
                            user_hourly_activity::Column::TotalActivities,
                            user_hourly_activity::Column::AverageActivitiesPerMinute,
                            user_hourly_activity::Column::UpdatedAt,
                        ])
                        .to_owned(),
                    )
                    .exec(db)
            })
            .await?;
        }

        let report = RollupReport {
            users: per_user.len(),
            activities: per_user.values().map(|c| c.total).sum(),
        };
        info!(
            "Hourly activity rollup for {}: {} users, {} activities",
            start, report.users, report.activities
        );
        Ok(report)
    }
}
