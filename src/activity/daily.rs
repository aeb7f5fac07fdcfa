//! 天级汇总：`user_hourly_activity` → `user_daily_metrics`
//!
//! 新行以 NORMAL / 允许结算 / UNPAID 写入；已存在的行只覆盖计数列，
//! 不会抹掉已完成的机器人判定与结算结果。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use sea_orm::{ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, sea_query::OnConflict};
use tracing::{debug, info};

use super::{ActivityCounts, MINUTES_PER_DAY, RollupReport, UPSERT_CHUNK};
use crate::errors::Result;
use crate::storage::SeaOrmStorage;
use crate::storage::backend::retry;
use crate::storage::models::{BotDetectionLevel, DailyPayoutStatus};
use crate::utils::day_window;
use migration::entities::{user_daily_metric, user_hourly_activity};

pub const AWAITING_DETECTION_REASON: &str = "Awaiting bot detection";

pub struct DailyActivityRollup {
    storage: Arc<SeaOrmStorage>,
}

impl DailyActivityRollup {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }

    pub async fn rollup_day(&self, date: NaiveDate) -> Result<RollupReport> {
        let (start, end) = day_window(date);

        let hourly = user_hourly_activity::Entity::find()
            .filter(user_hourly_activity::Column::HourStart.gte(start))
            .filter(user_hourly_activity::Column::HourStart.lt(end))
            .all(self.storage.get_db())
            .await?;

        if hourly.is_empty() {
            debug!("No hourly activity to roll up for {}", date);
            return Ok(RollupReport::default());
        }

        let mut per_user: HashMap<String, ActivityCounts> = HashMap::with_capacity(hourly.len());
        for row in &hourly {
            per_user.entry(row.user_id.clone()).or_default().merge(&ActivityCounts {
                views: row.total_views,
                likes: row.total_likes,
                comments: row.total_comments,
                total: row.total_activities,
            });
        }

        let now = Utc::now();
        let models: Vec<user_daily_metric::ActiveModel> = per_user
            .iter()
            .map(|(user_id, counts)| user_daily_metric::ActiveModel {
                user_id: Set(user_id.clone()),
                date: Set(date),
                total_views: Set(counts.views),
                total_likes: Set(counts.likes),
                total_comments: Set(counts.comments),
                total_activities: Set(counts.total),
                average_activities_per_minute: Set(counts.per_minute(MINUTES_PER_DAY)),
                bot_detection_level: Set(BotDetectionLevel::Normal.as_str().to_string()),
                bot_detection_reason: Set(Some(AWAITING_DETECTION_REASON.to_string())),
                is_payout_allowed: Set(true),
                classified_at: Set(None),
                total_payout_idr: Set(0.0),
                payout_status: Set(DailyPayoutStatus::Unpaid.as_str().to_string()),
                payout_transaction_id: Set(None),
                updated_at: Set(now),
                ..Default::default()
            })
            .collect();

        let db = self.storage.get_db();
        for chunk in models.chunks(UPSERT_CHUNK) {
            retry::with_retry("upsert_user_daily", self.storage.retry_config(), || {
                user_daily_metric::Entity::insert_many(chunk.to_vec())
                    .on_conflict(
                        OnConflict::columns([
                            user_daily_metric::Column::UserId,
                            user_daily_metric::Column::Date,
                        ])
                        .update_columns([
                            user_daily_metric::Column::TotalViews,
                            user_daily_metric::Column::TotalLikes,
                            user_daily_metric::Column::TotalComments,
                            user_daily_metric::Column::TotalActivities,
                            user_daily_metric::Column::AverageActivitiesPerMinute,
                            user_daily_metric::Column::UpdatedAt,
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
            "Daily activity rollup for {}: {} users, {} activities",
            date, report.users, report.activities
        );
        Ok(report)
    }
}
