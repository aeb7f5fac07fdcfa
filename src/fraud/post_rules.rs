//! 帖子级规则
//!
//! 纯函数：输入快照序列与阈值，输出状态、分数、原因和派生指标。
//! 快照可能乱序或重复（队列重投），计算前一律按 `fetched_at` 排序。

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value, json};

use super::{
    BOT_LIKELY_SCORE, DAILY_VIEW_WEIGHT, HIGH_LIKE_RATIO_WEIGHT, LOW_LIKE_RATIO_WEIGHT,
    MIN_DURATION_DAYS, MIN_SNAPSHOTS, MIN_SPIKE_DELTAS, SPIKE_WEIGHT, SPIKE_Z_SCORE,
    SUSPICIOUS_SCORE,
};
use crate::storage::PostThresholds;
use crate::storage::models::BotAnalysisStatus;
use crate::utils::round2;
use migration::entities::{bot_threshold, platform_metric_snapshot};

/// 序列中的一个点
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapshotPoint {
    pub fetched_at: DateTime<Utc>,
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
}

impl From<&platform_metric_snapshot::Model> for SnapshotPoint {
    fn from(s: &platform_metric_snapshot::Model) -> Self {
        Self {
            fetched_at: s.fetched_at,
            views: s.views,
            likes: s.likes,
            comments: s.comments,
        }
    }
}

/// 最大两点间浏览增量及其时间窗
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeakSpike {
    pub amount: i64,
    pub period_hours: f64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PeakSpike {
    /// 按 24 小时外推的速率，窗口不足 1 小时按 1 小时计
    pub fn daily_rate(&self) -> f64 {
        self.amount as f64 / self.period_hours.max(1.0) * 24.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMetrics {
    pub total_snapshots: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub like_to_view_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_to_view_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_days: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_daily_view_increase: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_daily_like_increase: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_daily_comment_increase: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peak_view_increase: Option<PeakSpike>,
    #[serde(skip)]
    pub view_deltas: Vec<i64>,
}

/// 最大的 `views[j] - views[i]`（i < j），单次遍历维护前缀最小值
pub fn peak_view_increase(series: &[SnapshotPoint]) -> Option<PeakSpike> {
    let first = series.first()?;
    let mut min_point = first;
    let mut best: Option<(&SnapshotPoint, &SnapshotPoint, i64)> = None;

    for point in &series[1..] {
        let increase = point.views - min_point.views;
        if increase > best.map_or(0, |(_, _, amount)| amount) {
            best = Some((min_point, point, increase));
        }
        if point.views < min_point.views {
            min_point = point;
        }
    }

    let (start, end, amount) = best?;
    let period_hours = (end.fetched_at - start.fetched_at).num_milliseconds() as f64 / 3_600_000.0;
    if period_hours <= 0.0 {
        return None;
    }
    Some(PeakSpike {
        amount,
        period_hours: round2(period_hours),
        start: start.fetched_at,
        end: end.fetched_at,
    })
}

/// 从快照序列计算派生指标
pub fn derive_metrics(snapshots: &[SnapshotPoint]) -> PostMetrics {
    let mut series = snapshots.to_vec();
    series.sort_by_key(|s| s.fetched_at);

    let mut metrics = PostMetrics {
        total_snapshots: series.len(),
        ..Default::default()
    };

    let (Some(first), Some(last)) = (series.first(), series.last()) else {
        return metrics;
    };

    if last.views > 0 {
        metrics.like_to_view_ratio = Some(last.likes as f64 / last.views as f64);
        metrics.comment_to_view_ratio = Some(last.comments as f64 / last.views as f64);
    }

    if series.len() >= MIN_SNAPSHOTS {
        let elapsed_days =
            (last.fetched_at - first.fetched_at).num_milliseconds() as f64 / 86_400_000.0;
        let days = elapsed_days.max(MIN_DURATION_DAYS);
        metrics.duration_days = Some(days);
        metrics.average_daily_view_increase = Some((last.views - first.views) as f64 / days);
        metrics.average_daily_like_increase = Some((last.likes - first.likes) as f64 / days);
        metrics.average_daily_comment_increase =
            Some((last.comments - first.comments) as f64 / days);
        metrics.peak_view_increase = peak_view_increase(&series);
        metrics.view_deltas = series.windows(2).map(|w| w[1].views - w[0].views).collect();
    }

    metrics
}

/// 相邻增量中正增量的最大 z-score（总体标准差）
///
/// 返回 `(max_z, mean, std_dev)`；增量不足或方差为 0 时返回 None。
pub fn max_delta_z_score(deltas: &[i64]) -> Option<(f64, f64, f64)> {
    if deltas.len() < MIN_SPIKE_DELTAS {
        return None;
    }
    let n = deltas.len() as f64;
    let mean = deltas.iter().map(|&d| d as f64).sum::<f64>() / n;
    let variance = deltas
        .iter()
        .map(|&d| (d as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    let std_dev = variance.sqrt();
    if std_dev <= 0.0 {
        return None;
    }
    deltas
        .iter()
        .filter(|&&d| d > 0)
        .map(|&d| (d as f64 - mean) / std_dev)
        .reduce(f64::max)
        .map(|z| (z, mean, std_dev))
}

/// 点赞/浏览比的上下界
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RatioBounds {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

/// 日均浏览增量阈值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyViewLimit {
    pub upper_bound: Option<f64>,
    pub mean: f64,
    pub std_dev: f64,
    pub level_a_multiplier: f64,
}

impl DailyViewLimit {
    pub fn distribution_limit(&self) -> f64 {
        self.mean + self.level_a_multiplier * self.std_dev
    }

    /// 超过绝对上界或分布上限之一
    pub fn is_exceeded_by(&self, value: f64) -> bool {
        self.upper_bound.is_some_and(|ub| value > ub) || value > self.distribution_limit()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RuleThresholds {
    pub like_view_ratio: Option<RatioBounds>,
    pub daily_view_increase: Option<DailyViewLimit>,
}

impl From<&PostThresholds> for RuleThresholds {
    fn from(t: &PostThresholds) -> Self {
        Self {
            like_view_ratio: t.like_view_ratio.as_ref().map(|row: &bot_threshold::Model| {
                RatioBounds {
                    lower: row.lower_bound.filter(|v| *v > 0.0),
                    upper: row.upper_bound.filter(|v| *v > 0.0),
                }
            }),
            daily_view_increase: t.daily_view_increase.as_ref().map(|row| DailyViewLimit {
                upper_bound: row.upper_bound.filter(|v| *v > 0.0),
                mean: row.mean,
                std_dev: row.std_dev,
                level_a_multiplier: row.level_a_multiplier,
            }),
        }
    }
}

/// 一次分析的结论
#[derive(Debug, Clone, PartialEq)]
pub struct PostVerdict {
    pub status: BotAnalysisStatus,
    /// INSUFFICIENT_DATA 时为 None
    pub score: Option<f64>,
    pub reasons: Vec<String>,
    pub details: Value,
}

impl PostVerdict {
    pub fn reason(&self) -> String {
        self.reasons.join("; ")
    }
}

pub fn classify_score(score: f64) -> BotAnalysisStatus {
    if score >= BOT_LIKELY_SCORE {
        BotAnalysisStatus::BotLikely
    } else if score >= SUSPICIOUS_SCORE {
        BotAnalysisStatus::Suspicious
    } else {
        BotAnalysisStatus::Normal
    }
}

/// 对派生指标打分
pub fn evaluate(metrics: &PostMetrics, thresholds: &RuleThresholds) -> PostVerdict {
    let mut details = match serde_json::to_value(metrics) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };

    if metrics.total_snapshots < MIN_SNAPSHOTS {
        return PostVerdict {
            status: BotAnalysisStatus::InsufficientData,
            score: None,
            reasons: vec![format!(
                "Not enough metric snapshots for analysis ({} of {})",
                metrics.total_snapshots, MIN_SNAPSHOTS
            )],
            details: Value::Object(details),
        };
    }

    let mut score = 0.0;
    let mut reasons = Vec::new();

    // 点赞/浏览比
    if let (Some(ratio), Some(bounds)) = (metrics.like_to_view_ratio, thresholds.like_view_ratio) {
        if let Some(upper) = bounds.upper.filter(|u| ratio > *u) {
            score += HIGH_LIKE_RATIO_WEIGHT;
            reasons.push(format!(
                "High like/view ratio: {:.1}% (threshold {:.1}%)",
                ratio * 100.0,
                upper * 100.0
            ));
            details.insert("likeViewRatioBreach".into(), json!({"value": ratio, "upper": upper}));
        } else if let Some(lower) = bounds.lower.filter(|l| ratio < *l) {
            score += LOW_LIKE_RATIO_WEIGHT;
            reasons.push(format!(
                "Low like/view ratio: {:.1}% (threshold {:.1}%)",
                ratio * 100.0,
                lower * 100.0
            ));
            details.insert("likeViewRatioBreach".into(), json!({"value": ratio, "lower": lower}));
        }
    }

    // 日均浏览增量
    if let (Some(daily), Some(limit)) = (
        metrics.average_daily_view_increase,
        thresholds.daily_view_increase,
    ) && limit.is_exceeded_by(daily)
    {
        score += DAILY_VIEW_WEIGHT;
        reasons.push(format!(
            "High daily view increase: {:.0}/day (mean {:.0}, limit {:.0})",
            daily,
            limit.mean,
            limit
                .upper_bound
                .map_or(limit.distribution_limit(), |ub| ub.min(limit.distribution_limit()))
        ));
        details.insert(
            "dailyViewBreach".into(),
            json!({
                "value": daily,
                "upperBound": limit.upper_bound,
                "distributionLimit": limit.distribution_limit(),
            }),
        );
    }

    // 浏览突增
    if let Some((z, mean, std_dev)) = max_delta_z_score(&metrics.view_deltas) {
        details.insert("viewDeltaMean".into(), json!(mean));
        details.insert("viewDeltaStdDev".into(), json!(std_dev));
        details.insert("maxDeltaZScore".into(), json!(round2(z)));
        if z > SPIKE_Z_SCORE {
            score += SPIKE_WEIGHT;
            reasons.push(format!(
                "Significant view spike detected (z-score {:.1}, mean delta {:.0}, std dev {:.0})",
                z, mean, std_dev
            ));
        }
    } else if let (Some(peak), Some(limit)) =
        (&metrics.peak_view_increase, thresholds.daily_view_increase)
    {
        // 序列太短或增量无方差：按峰值速率外推到 24 小时判定
        let rate = peak.daily_rate();
        details.insert("peakDailyRate".into(), json!(rate));
        if limit.is_exceeded_by(rate) {
            score += SPIKE_WEIGHT;
            reasons.push(format!(
                "View spike: +{} views in {:.2}h (~{:.0}/day)",
                peak.amount, peak.period_hours, rate
            ));
        }
    }

    let score = round2(f64::min(score, 1.0).max(0.0));
    let status = classify_score(score);
    if reasons.is_empty() {
        reasons.push("No suspicious patterns detected".to_string());
    }
    details.insert("score".into(), json!(score));

    PostVerdict {
        status,
        score: Some(score),
        reasons,
        details: Value::Object(details),
    }
}

/// 派生指标 + 打分
pub fn analyze_series(snapshots: &[SnapshotPoint], thresholds: &RuleThresholds) -> PostVerdict {
    evaluate(&derive_metrics(snapshots), thresholds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap()
    }

    fn point(hours: i64, views: i64, likes: i64) -> SnapshotPoint {
        SnapshotPoint {
            fetched_at: t0() + Duration::hours(hours),
            views,
            likes,
            comments: likes / 10,
        }
    }

    fn seeded_thresholds() -> RuleThresholds {
        RuleThresholds {
            like_view_ratio: Some(RatioBounds {
                lower: Some(0.005),
                upper: Some(0.5),
            }),
            daily_view_increase: Some(DailyViewLimit {
                upper_bound: Some(500_000.0),
                mean: 5_000.0,
                std_dev: 2_000.0,
                level_a_multiplier: 3.0,
            }),
        }
    }

    fn brute_force_peak(series: &[SnapshotPoint]) -> i64 {
        let mut best = 0;
        for i in 0..series.len() {
            for j in i + 1..series.len() {
                best = best.max(series[j].views - series[i].views);
            }
        }
        best
    }

    #[test]
    fn test_single_snapshot_is_insufficient() {
        let verdict = analyze_series(&[point(0, 1_000_000, 1)], &seeded_thresholds());
        assert_eq!(verdict.status, BotAnalysisStatus::InsufficientData);
        assert_eq!(verdict.score, None);

        let verdict = analyze_series(&[], &seeded_thresholds());
        assert_eq!(verdict.status, BotAnalysisStatus::InsufficientData);
    }

    #[test]
    fn test_hour_long_jump_is_bot_likely() {
        let verdict = analyze_series(
            &[point(0, 1_000, 50), point(1, 50_000, 2_500)],
            &seeded_thresholds(),
        );
        assert_eq!(verdict.status, BotAnalysisStatus::BotLikely);
        assert!(verdict.score.unwrap() >= 0.7);
        assert!(verdict.reason().contains("daily view increase"));
        assert!(verdict.reason().contains("spike"));
    }

    #[test]
    fn test_steady_growth_is_normal() {
        // 5% 点赞率，日增 4800（均值 1σ 内）
        let snapshots: Vec<_> = (0..=6)
            .map(|d| {
                let views = 10_000 + d * 4_800;
                point(d * 24, views, views / 20)
            })
            .collect();
        let verdict = analyze_series(&snapshots, &seeded_thresholds());
        assert_eq!(verdict.status, BotAnalysisStatus::Normal);
        assert_eq!(verdict.score, Some(0.0));
    }

    #[test]
    fn test_unsorted_input_is_sorted_first() {
        let verdict = analyze_series(
            &[point(1, 50_000, 2_500), point(0, 1_000, 50)],
            &seeded_thresholds(),
        );
        assert_eq!(verdict.status, BotAnalysisStatus::BotLikely);
    }

    #[test]
    fn test_like_ratio_penalties() {
        let high = analyze_series(
            &[point(0, 100, 10), point(24, 200, 150)],
            &seeded_thresholds(),
        );
        assert_eq!(high.score, Some(HIGH_LIKE_RATIO_WEIGHT));
        assert_eq!(high.status, BotAnalysisStatus::Suspicious);

        let low = analyze_series(
            &[point(0, 1_000, 1), point(24, 2_000, 1)],
            &seeded_thresholds(),
        );
        assert_eq!(low.score, Some(LOW_LIKE_RATIO_WEIGHT));
        assert_eq!(low.status, BotAnalysisStatus::Normal);
    }

    #[test]
    fn test_z_score_spike_in_long_series() {
        let mut snapshots: Vec<_> = (0..20).map(|h| point(h * 6, 1_000 + h * 100, 50)).collect();
        // 最后一个点突增，其余增量恒为 100
        snapshots.push(point(120, 2_900 + 40_000, 2_000));
        let metrics = derive_metrics(&snapshots);
        let (z, _, _) = max_delta_z_score(&metrics.view_deltas).unwrap();
        assert!(z > SPIKE_Z_SCORE);

        let verdict = evaluate(&metrics, &RuleThresholds::default());
        assert_eq!(verdict.score, Some(SPIKE_WEIGHT));
        assert_eq!(verdict.status, BotAnalysisStatus::Suspicious);
    }

    #[test]
    fn test_zero_variance_deltas_skip_z_score() {
        assert!(max_delta_z_score(&[100, 100, 100, 100]).is_none());
        assert!(max_delta_z_score(&[1, 2]).is_none());
    }

    #[test]
    fn test_peak_matches_pairwise_scan() {
        let views = [500, 300, 900, 100, 700, 650, 1_200, 50, 400];
        let series: Vec<_> = views
            .iter()
            .enumerate()
            .map(|(i, v)| point(i as i64, *v, 0))
            .collect();
        let peak = peak_view_increase(&series).unwrap();
        assert_eq!(peak.amount, brute_force_peak(&series));
        assert_eq!(peak.amount, 1_100);
        assert_eq!(peak.start, t0() + Duration::hours(3));
        assert_eq!(peak.end, t0() + Duration::hours(6));
        assert_eq!(peak.period_hours, 3.0);
    }

    #[test]
    fn test_peak_none_for_monotonic_decrease() {
        let series = [point(0, 900, 0), point(1, 800, 0), point(2, 10, 0)];
        assert!(peak_view_increase(&series).is_none());
    }

    #[test]
    fn test_duration_clamped_to_one_hour() {
        let metrics = derive_metrics(&[
            SnapshotPoint {
                fetched_at: t0(),
                views: 0,
                likes: 0,
                comments: 0,
            },
            SnapshotPoint {
                fetched_at: t0() + Duration::minutes(6),
                views: 100,
                likes: 0,
                comments: 0,
            },
        ]);
        assert_eq!(metrics.duration_days, Some(MIN_DURATION_DAYS));
        assert!((metrics.average_daily_view_increase.unwrap() - 2_400.0).abs() < 1e-6);
    }

    #[test]
    fn test_no_thresholds_only_spike_rule_applies() {
        let verdict = analyze_series(
            &[point(0, 1_000, 50), point(1, 50_000, 2_500)],
            &RuleThresholds::default(),
        );
        assert_eq!(verdict.status, BotAnalysisStatus::Normal);
        assert_eq!(verdict.score, Some(0.0));
    }

    #[test]
    fn test_details_carry_derived_metrics() {
        let verdict = analyze_series(
            &[point(0, 1_000, 50), point(1, 50_000, 2_500)],
            &seeded_thresholds(),
        );
        assert_eq!(verdict.details["totalSnapshots"], json!(2));
        assert!(verdict.details["peakViewIncrease"]["amount"].is_number());
        assert!(verdict.details.get("viewDeltas").is_none());
    }
}
