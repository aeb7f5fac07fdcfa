//! 每周阈值校准
//!
//! 以近期未被标记的活跃用户为样本，重算 `global_default` 的均值与样本标准差。
//! 新版本与旧版本的切换在同一事务内完成。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    TransactionTrait, sea_query::Expr,
};
use tracing::{info, warn};

use crate::config::CalibrationConfig;
use crate::errors::Result;
use crate::storage::SeaOrmStorage;
use crate::storage::models::{BotDetectionLevel, UserStatus};
use migration::entities::{bot_threshold, user, user_daily_metric};

#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationOutcome {
    /// 样本不足，阈值保持不变
    Skipped { samples: usize },
    Updated {
        version: i32,
        mean: f64,
        std_dev: f64,
        samples: usize,
    },
}

/// 均值与样本标准差（n − 1）；少于 2 个样本返回 None
pub fn sample_stats(samples: &[f64]) -> Option<(f64, f64)> {
    let n = samples.len();
    if n < 2 {
        return None;
    }
    let mean = samples.iter().sum::<f64>() / n as f64;
    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    Some((mean, variance.sqrt()))
}

pub struct ThresholdCalibrator {
    storage: Arc<SeaOrmStorage>,
    config: CalibrationConfig,
}

impl ThresholdCalibrator {
    pub fn new(storage: Arc<SeaOrmStorage>, config: CalibrationConfig) -> Self {
        Self { storage, config }
    }

    /// 回看窗口内 NORMAL 级别、ACTIVE 用户的日均每分钟活动量
    pub async fn collect_samples(&self, now: DateTime<Utc>) -> Result<Vec<f64>> {
        let since = (now - Duration::days(self.config.lookback_days)).date_naive();
        let samples: Vec<f64> = user_daily_metric::Entity::find()
            .select_only()
            .column(user_daily_metric::Column::AverageActivitiesPerMinute)
            .inner_join(user::Entity)
            .filter(user::Column::Status.eq(UserStatus::Active.as_str()))
            .filter(
                user_daily_metric::Column::BotDetectionLevel.eq(BotDetectionLevel::Normal.as_str()),
            )
            .filter(user_daily_metric::Column::Date.gte(since))
            .into_tuple()
            .all(self.storage.get_db())
            .await?;
        Ok(samples)
    }

    pub async fn calibrate(&self, now: DateTime<Utc>) -> Result<CalibrationOutcome> {
        let samples = self.collect_samples(now).await?;
        let n = samples.len();

        let stats = if n >= self.config.min_samples.max(2) {
            sample_stats(&samples)
        } else {
            None
        };
        let Some((mean, std_dev)) = stats else {
            warn!(
                "Threshold '{}' not recalibrated: {} samples (< {})",
                self.config.threshold_name, n, self.config.min_samples
            );
            return Ok(CalibrationOutcome::Skipped { samples: n });
        };

        let name = self.config.threshold_name.as_str();
        let txn = self.storage.get_db().begin().await?;

        let current = bot_threshold::Entity::find()
            .filter(bot_threshold::Column::Name.eq(name))
            .order_by_desc(bot_threshold::Column::Version)
            .one(&txn)
            .await?;

        let (version, multipliers) = match &current {
            Some(row) => (
                row.version + 1,
                (
                    row.level_a_multiplier,
                    row.level_b_min_multiplier,
                    row.level_b_max_multiplier,
                ),
            ),
            None => (
                1,
                (
                    self.config.level_a_multiplier,
                    self.config.level_b_min_multiplier,
                    self.config.level_b_max_multiplier,
                ),
            ),
        };

        bot_threshold::Entity::update_many()
            .col_expr(bot_threshold::Column::IsActive, Expr::value(false))
            .col_expr(bot_threshold::Column::UpdatedAt, Expr::value(now))
            .filter(bot_threshold::Column::Name.eq(name))
            .filter(bot_threshold::Column::IsActive.eq(true))
            .exec(&txn)
            .await?;

        bot_threshold::Entity::insert(bot_threshold::ActiveModel {
            name: Set(name.to_string()),
            platform: Set(current.as_ref().and_then(|c| c.platform.clone())),
            metric_type: Set(current.as_ref().and_then(|c| c.metric_type.clone())),
            mean: Set(mean),
            std_dev: Set(std_dev),
            lower_bound: Set(None),
            upper_bound: Set(None),
            level_a_multiplier: Set(multipliers.0),
            level_b_min_multiplier: Set(multipliers.1),
            level_b_max_multiplier: Set(multipliers.2),
            is_active: Set(true),
            version: Set(version),
            sample_size: Set(Some(n as i32)),
            description: Set(Some(format!(
                "Calibrated from {} daily metrics over the last {} days",
                n, self.config.lookback_days
            ))),
            updated_at: Set(now),
            ..Default::default()
        })
        .exec(&txn)
        .await?;

        txn.commit().await?;

        info!(
            "Threshold '{}' recalibrated to v{}: mean={:.4}, std_dev={:.4}, samples={}",
            name, version, mean, std_dev, n
        );
        Ok(CalibrationOutcome::Updated {
            version,
            mean,
            std_dev,
            samples: n,
        })
    }
}
