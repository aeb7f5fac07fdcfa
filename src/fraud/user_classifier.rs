//! 用户级机器人判定
//!
//! 把某天的 `average_activities_per_minute` 与 `global_default` 阈值对比。
//! A 级会把账户置为 BANNED，且永不自动解封。

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use sea_orm::ActiveValue::{Set, Unchanged};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, sea_query::Expr};
use tracing::{info, warn};

use super::{GLOBAL_THRESHOLD_NAME, ZERO_STD_BAN_FACTOR};
use crate::errors::Result;
use crate::storage::SeaOrmStorage;
use crate::storage::backend::retry;
use crate::storage::models::{BotDetectionLevel, DailyPayoutStatus, UserStatus};
use crate::utils::truncate_reason;
use migration::entities::{bot_threshold, user, user_daily_metric};

#[derive(Debug, Clone, PartialEq)]
pub struct UserClassification {
    pub level: BotDetectionLevel,
    pub payout_allowed: bool,
    pub reason: String,
}

impl UserClassification {
    fn normal(reason: String) -> Self {
        Self {
            level: BotDetectionLevel::Normal,
            payout_allowed: true,
            reason,
        }
    }

    fn flagged(level: BotDetectionLevel, reason: String) -> Self {
        Self {
            level,
            payout_allowed: false,
            reason,
        }
    }
}

/// 单个速率值的判定
pub fn classify_rate(value: f64, threshold: &bot_threshold::Model) -> UserClassification {
    let mean = threshold.mean;
    let std_dev = threshold.std_dev;

    if std_dev <= 0.0 {
        let ban_limit = mean * ZERO_STD_BAN_FACTOR;
        return if value > ban_limit {
            UserClassification::flagged(
                BotDetectionLevel::BannedLevelA,
                format!(
                    "Activity rate {:.4}/min exceeds {:.4} ({}x mean, zero std dev)",
                    value, ban_limit, ZERO_STD_BAN_FACTOR
                ),
            )
        } else if value > mean {
            UserClassification::flagged(
                BotDetectionLevel::WarningLevelB,
                format!(
                    "Activity rate {:.4}/min exceeds mean {:.4} (zero std dev)",
                    value, mean
                ),
            )
        } else {
            UserClassification::normal(format!(
                "Activity rate {:.4}/min within normal range",
                value
            ))
        };
    }

    let level_a = mean + threshold.level_a_multiplier * std_dev;
    let level_b_min = mean + threshold.level_b_min_multiplier * std_dev;
    let level_b_max = mean
        + threshold
            .level_b_min_multiplier
            .max(threshold.level_b_max_multiplier)
            * std_dev;

    if value > level_a {
        UserClassification::flagged(
            BotDetectionLevel::BannedLevelA,
            format!(
                "Activity rate {:.4}/min exceeds level A limit {:.4} (mean {:.4} + {}σ)",
                value, level_a, mean, threshold.level_a_multiplier
            ),
        )
    } else if value > level_b_min && value <= level_b_max {
        UserClassification::flagged(
            BotDetectionLevel::WarningLevelB,
            format!(
                "Activity rate {:.4}/min in level B band ({:.4}, {:.4}]",
                value, level_b_min, level_b_max
            ),
        )
    } else {
        UserClassification::normal(format!(
            "Activity rate {:.4}/min within normal range",
            value
        ))
    }
}

/// 一次判定的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationReport {
    pub classified: usize,
    pub warned: usize,
    pub banned: usize,
    /// 无生效阈值时为 true
    pub threshold_missing: bool,
}

pub struct UserClassifier {
    storage: Arc<SeaOrmStorage>,
}

impl UserClassifier {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }

    /// 判定某天所有未结算的用户日指标
    pub async fn classify_day(&self, date: NaiveDate) -> Result<ClassificationReport> {
        let threshold = self.storage.active_threshold(GLOBAL_THRESHOLD_NAME).await?;
        let db = self.storage.get_db();

        let rows = user_daily_metric::Entity::find()
            .filter(user_daily_metric::Column::Date.eq(date))
            .filter(user_daily_metric::Column::PayoutStatus.eq(DailyPayoutStatus::Unpaid.as_str()))
            .all(db)
            .await?;

        let mut report = ClassificationReport {
            threshold_missing: threshold.is_none(),
            ..Default::default()
        };
        if threshold.is_none() {
            warn!(
                "No active '{}' threshold, {} daily metrics for {} left NORMAL",
                GLOBAL_THRESHOLD_NAME,
                rows.len(),
                date
            );
        }

        for row in rows {
            let verdict = match &threshold {
                Some(t) => classify_rate(row.average_activities_per_minute, t),
                None => UserClassification::normal(format!(
                    "Bot detection skipped: no active '{}' threshold",
                    GLOBAL_THRESHOLD_NAME
                )),
            };

            let now = Utc::now();
            let changes = user_daily_metric::ActiveModel {
                id: Unchanged(row.id),
                bot_detection_level: Set(verdict.level.as_str().to_string()),
                bot_detection_reason: Set(Some(truncate_reason(&verdict.reason))),
                is_payout_allowed: Set(verdict.payout_allowed),
                classified_at: Set(Some(now)),
                updated_at: Set(now),
                ..Default::default()
            };
            retry::with_retry(
                &format!("classify_daily_metric({})", row.id),
                self.storage.retry_config(),
                || user_daily_metric::Entity::update(changes.clone()).exec(db),
            )
            .await?;

            match verdict.level {
                BotDetectionLevel::BannedLevelA => {
                    report.banned += 1;
                    self.ban_user(&row.user_id).await?;
                    warn!(
                        "User {} banned for {}: {}",
                        row.user_id, date, verdict.reason
                    );
                }
                BotDetectionLevel::WarningLevelB => {
                    report.warned += 1;
                    warn!(
                        "User {} flagged for review on {}: {}",
                        row.user_id, date, verdict.reason
                    );
                }
                BotDetectionLevel::Normal => {}
            }
            report.classified += 1;
        }

        info!(
            "Classified {} daily metrics for {}: {} warned, {} banned",
            report.classified, date, report.warned, report.banned
        );
        Ok(report)
    }

    async fn ban_user(&self, user_id: &str) -> Result<()> {
        let db = self.storage.get_db();
        let now = Utc::now();
        retry::with_retry(
            &format!("ban_user({})", user_id),
            self.storage.retry_config(),
            || {
                user::Entity::update_many()
                    .col_expr(user::Column::Status, Expr::value(UserStatus::Banned.as_str()))
                    .col_expr(user::Column::UpdatedAt, Expr::value(now))
                    .filter(user::Column::Id.eq(user_id))
                    .filter(user::Column::Status.ne(UserStatus::Banned.as_str()))
                    .exec(db)
            },
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn threshold(mean: f64, std_dev: f64) -> bot_threshold::Model {
        bot_threshold::Model {
            id: 1,
            name: GLOBAL_THRESHOLD_NAME.to_string(),
            platform: None,
            metric_type: None,
            mean,
            std_dev,
            lower_bound: None,
            upper_bound: None,
            level_a_multiplier: 3.0,
            level_b_min_multiplier: 2.0,
            level_b_max_multiplier: 3.0,
            is_active: true,
            version: 1,
            sample_size: Some(10),
            description: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_four_sigma_is_level_a() {
        let verdict = classify_rate(10.0 + 4.0 * 2.0, &threshold(10.0, 2.0));
        assert_eq!(verdict.level, BotDetectionLevel::BannedLevelA);
        assert!(!verdict.payout_allowed);
    }

    #[test]
    fn test_level_b_band_is_half_open() {
        let t = threshold(10.0, 2.0);
        // (14, 16]
        assert_eq!(classify_rate(14.0, &t).level, BotDetectionLevel::Normal);
        assert_eq!(classify_rate(14.5, &t).level, BotDetectionLevel::WarningLevelB);
        assert_eq!(classify_rate(16.0, &t).level, BotDetectionLevel::WarningLevelB);
        assert!(!classify_rate(15.0, &t).payout_allowed);
        assert_eq!(classify_rate(16.01, &t).level, BotDetectionLevel::BannedLevelA);
    }

    #[test]
    fn test_inverted_b_multipliers_collapse_band() {
        let mut t = threshold(10.0, 2.0);
        t.level_b_min_multiplier = 2.5;
        t.level_b_max_multiplier = 1.0;
        t.level_a_multiplier = 4.0;
        // 带宽为空：(15, 15]
        assert_eq!(classify_rate(15.5, &t).level, BotDetectionLevel::Normal);
        assert_eq!(classify_rate(18.5, &t).level, BotDetectionLevel::BannedLevelA);
    }

    #[test]
    fn test_zero_std_dev_uses_mean_factors() {
        let t = threshold(10.0, 0.0);
        assert_eq!(classify_rate(10.0, &t).level, BotDetectionLevel::Normal);
        assert_eq!(classify_rate(12.0, &t).level, BotDetectionLevel::WarningLevelB);
        assert_eq!(classify_rate(15.0, &t).level, BotDetectionLevel::WarningLevelB);
        assert_eq!(classify_rate(15.1, &t).level, BotDetectionLevel::BannedLevelA);
    }

    #[test]
    fn test_normal_allows_payout() {
        let verdict = classify_rate(9.0, &threshold(10.0, 2.0));
        assert_eq!(verdict.level, BotDetectionLevel::Normal);
        assert!(verdict.payout_allowed);
    }
}
