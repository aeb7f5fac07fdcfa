//! 用户活动汇总
//!
//! 原始 `activity_logs` → 小时汇总 → 天级汇总，外加每周的阈值校准。
//! 所有窗口均为 UTC 左闭右开。

pub mod calibration;
pub mod daily;
pub mod hourly;
pub mod recorder;

pub use calibration::{CalibrationOutcome, ThresholdCalibrator, sample_stats};
pub use daily::DailyActivityRollup;
pub use hourly::HourlyActivityRollup;
pub use recorder::{ActivityEvent, ActivityRecorder};

use std::str::FromStr;

use crate::storage::models::ActivityType;

pub const MINUTES_PER_HOUR: f64 = 60.0;
pub const MINUTES_PER_DAY: f64 = 1440.0;

/// 单批 insert_many 的行数，避免超出 SQLite 绑定变量上限
pub(crate) const UPSERT_CHUNK: usize = 100;

/// 按活动类型累加的计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityCounts {
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    pub total: i64,
}

impl ActivityCounts {
    /// 未知类型只计入总数
    pub fn add(&mut self, activity_type: &str, count: i64) {
        match ActivityType::from_str(activity_type) {
            Ok(ActivityType::View) => self.views += count,
            Ok(ActivityType::Like) => self.likes += count,
            Ok(ActivityType::Comment) => self.comments += count,
            Err(_) => {}
        }
        self.total += count;
    }

    pub fn merge(&mut self, other: &ActivityCounts) {
        self.views += other.views;
        self.likes += other.likes;
        self.comments += other.comments;
        self.total += other.total;
    }

    pub fn per_minute(&self, minutes: f64) -> f64 {
        self.total as f64 / minutes
    }
}

/// 一次汇总写入的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollupReport {
    pub users: usize,
    pub activities: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_by_type() {
        let mut counts = ActivityCounts::default();
        counts.add("VIEW", 50);
        counts.add("like", 7);
        counts.add("COMMENT", 3);
        counts.add("SHARE", 2);
        assert_eq!(counts.views, 50);
        assert_eq!(counts.likes, 7);
        assert_eq!(counts.comments, 3);
        assert_eq!(counts.total, 62);
        assert!((counts.per_minute(MINUTES_PER_HOUR) - 62.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_merge() {
        let mut a = ActivityCounts {
            views: 1,
            likes: 2,
            comments: 3,
            total: 6,
        };
        a.merge(&a.clone());
        assert_eq!(a.total, 12);
        assert_eq!(a.comments, 6);
    }
}
