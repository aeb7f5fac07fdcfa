//! 机器人流量识别
//!
//! - 帖子级：基于快照时间序列的规则打分（[`post_rules`]、[`analyzer`]）
//! - 用户级：日均活动速率对比总体分布（[`user_classifier`]）

pub mod analyzer;
pub mod post_rules;
pub mod user_classifier;

pub use analyzer::{AnalyzerReport, PostAnalyzer};
pub use post_rules::{PostMetrics, PostVerdict, RuleThresholds, SnapshotPoint, analyze_series};
pub use user_classifier::{
    ClassificationReport, UserClassification, UserClassifier, classify_rate,
};

// ============================================================
// Post-level scoring
// ============================================================

/// 至少需要的快照数
pub const MIN_SNAPSHOTS: usize = 2;
/// 计算日均增量时的最小时长（1 小时）
pub const MIN_DURATION_DAYS: f64 = 1.0 / 24.0;

/// 点赞/浏览比高于上界
pub const HIGH_LIKE_RATIO_WEIGHT: f64 = 0.3;
/// 点赞/浏览比低于下界（疑似刷量但无真实互动）
pub const LOW_LIKE_RATIO_WEIGHT: f64 = 0.2;
/// 日均浏览增量越界
pub const DAILY_VIEW_WEIGHT: f64 = 0.5;
/// 浏览量突增
pub const SPIKE_WEIGHT: f64 = 0.4;

pub const SPIKE_Z_SCORE: f64 = 3.5;
/// z-score 检测需要的最少相邻增量个数
pub const MIN_SPIKE_DELTAS: usize = 3;

pub const BOT_LIKELY_SCORE: f64 = 0.7;
pub const SUSPICIOUS_SCORE: f64 = 0.3;

// ============================================================
// User-level classification
// ============================================================

/// 用户级判定使用的阈值名
pub const GLOBAL_THRESHOLD_NAME: &str = "global_default";
/// σ = 0 时超过 μ 的该倍数直接判为 A 级
pub const ZERO_STD_BAN_FACTOR: f64 = 1.5;
