use serde::{Deserialize, Serialize};

use crate::errors::{PromoGuardError, Result};

/// 静态配置（从 TOML + 环境变量加载，启动时使用）
///
/// 包含：
/// - database: 数据库连接与重试
/// - logging: 日志输出
/// - scheduler / harvester: 指标抓取调度与队列消费
/// - analyzer: 帖子级机器人分析
/// - aggregator / calibration: 用户活动汇总与阈值校准
/// - settlement: 结算
/// - platforms: 各社交平台 API 端点
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StaticConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub harvester: HarvesterConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub settlement: SettlementConfig,
    #[serde(default)]
    pub platforms: PlatformsConfig,
}

impl StaticConfig {
    /// 从 TOML 文件和环境变量加载配置
    ///
    /// 优先级：ENV > TOML > 默认值
    /// ENV 前缀：PG，分隔符：__
    /// 示例：PG__SCHEDULER__BATCH_SIZE=50
    pub fn load(path: Option<&str>) -> Result<Self> {
        use config::{Config, Environment, File};

        let path = path.unwrap_or("config.toml");

        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("PG")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| PromoGuardError::config(format!("Failed to build config: {}", e)))?;

        let config = settings.try_deserialize::<StaticConfig>().map_err(|e| {
            PromoGuardError::config(format!("Failed to deserialize config: {}", e))
        })?;

        config.validate()?;

        if std::path::Path::new(path).exists() {
            eprintln!("[INFO] Configuration loaded from: {}", path);
        }
        Ok(config)
    }

    /// 校验跨字段约束
    ///
    /// 天级汇总读取的是小时行，必须排在小时汇总之后。
    pub fn validate(&self) -> Result<()> {
        let aggregator = &self.aggregator;
        if aggregator.hourly_minute > 59 || aggregator.daily_minute > 59 {
            return Err(PromoGuardError::config(format!(
                "aggregator minutes must be within 0-59 (hourly_minute={}, daily_minute={})",
                aggregator.hourly_minute, aggregator.daily_minute
            )));
        }
        if aggregator.daily_minute <= aggregator.hourly_minute {
            return Err(PromoGuardError::config(format!(
                "aggregator.daily_minute ({}) must be later than aggregator.hourly_minute ({})",
                aggregator.daily_minute, aggregator.hourly_minute
            )));
        }
        Ok(())
    }

    /// 生成示例 TOML 配置文件
    pub fn generate_sample_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|e| format!("Error generating sample config: {}", e))
    }
}

/// 数据库连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_database_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_database_timeout")]
    pub timeout: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_enable_rotation")]
    pub enable_rotation: bool,
}

/// 抓取调度配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_scheduler_interval_secs")]
    pub interval_secs: u64,
    /// 单次扫描最多入队的帖子数
    #[serde(default = "default_scheduler_batch_size")]
    pub batch_size: u64,
    /// 入队后 next_check_at 前移的冷却时间
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: i64,
    /// 成功抓取后的新鲜度窗口
    #[serde(default = "default_freshness_hours")]
    pub freshness_hours: i64,
    /// 暂时性错误后的重试窗口（指数退避的基数）
    #[serde(default = "default_retry_window_minutes")]
    pub retry_window_minutes: i64,
    #[serde(default = "default_max_backoff_hours")]
    pub max_backoff_hours: i64,
    /// FETCHING 状态超过该时长视为消费者崩溃，重新调度
    #[serde(default = "default_stale_lease_minutes")]
    pub stale_fetching_minutes: i64,
    #[serde(default = "default_active_promotion_statuses")]
    pub active_promotion_statuses: Vec<String>,
}

/// 队列消费配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvesterConfig {
    #[serde(default = "default_harvester_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_harvester_receive_batch")]
    pub receive_batch: u64,
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: i64,
    /// 超过该投递次数的消息进入死信
    #[serde(default = "default_max_deliveries")]
    pub max_deliveries: i32,
    #[serde(default = "default_nack_delay_secs")]
    pub nack_delay_secs: i64,
    /// 单次平台 API 调用超时
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 已完成消息保留时长
    #[serde(default = "default_done_retention_hours")]
    pub done_retention_hours: i64,
    /// 死信保留时长，留给人工排查
    #[serde(default = "default_dead_retention_days")]
    pub dead_retention_days: i64,
    #[serde(default = "default_purge_interval_secs")]
    pub purge_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default = "default_analyzer_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_analyzer_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_stale_lease_minutes")]
    pub stale_analysis_minutes: i64,
}

/// 用户活动汇总的触发时间（UTC）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// 每小时第几分钟汇总上一小时
    #[serde(default = "default_hourly_minute")]
    pub hourly_minute: u32,
    /// 每天 00:MM 汇总前一天
    #[serde(default = "default_daily_minute")]
    pub daily_minute: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    #[serde(default = "default_threshold_name")]
    pub threshold_name: String,
    /// 样本数低于该值时不覆盖阈值
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
    #[serde(default = "default_level_a_multiplier")]
    pub level_a_multiplier: f64,
    #[serde(default = "default_level_b_min_multiplier")]
    pub level_b_min_multiplier: f64,
    #[serde(default = "default_level_b_max_multiplier")]
    pub level_b_max_multiplier: f64,
    /// 周几运行（1 = 周一）
    #[serde(default = "default_calibration_weekday")]
    pub weekday: u32,
    #[serde(default = "default_calibration_hour")]
    pub hour: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    #[serde(default = "default_settlement_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_settlement_batch_size")]
    pub batch_size: u64,
    /// 低于该金额记为零金额结算，不写账本
    #[serde(default = "default_min_payout_idr")]
    pub min_payout_idr: f64,
    /// "views_only" 或 "weighted"
    #[serde(default = "default_payout_formula")]
    pub formula: String,
    #[serde(default)]
    pub like_weight: f64,
    #[serde(default)]
    pub comment_weight: f64,
    /// 用户天级活动结算费率（每单位 每分钟平均活动量）
    #[serde(default = "default_daily_rate_fee_idr")]
    pub daily_rate_fee_idr: f64,
    #[serde(default = "default_true")]
    pub daily_payout_enabled: bool,
    /// PAYOUT_PROCESSING 超过该时长视为中断
    #[serde(default = "default_stale_lease_minutes")]
    pub stale_processing_minutes: i64,
}

/// 平台 API 端点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformsConfig {
    #[serde(default = "default_tiktok_api_base")]
    pub tiktok_api_base: String,
    #[serde(default = "default_instagram_api_base")]
    pub instagram_api_base: String,
    #[serde(default = "default_youtube_api_base")]
    pub youtube_api_base: String,
    /// 没有 OAuth 凭证时使用的 YouTube Data API key
    #[serde(default)]
    pub youtube_api_key: Option<String>,
}

// ============================================================
// Default value functions
// ============================================================

fn default_true() -> bool {
    true
}

fn default_database_url() -> String {
    "promoguard.db".to_string()
}

fn default_database_pool_size() -> u32 {
    10
}

fn default_database_timeout() -> u64 {
    30
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_max_backups() -> u32 {
    5
}

fn default_enable_rotation() -> bool {
    true
}

fn default_scheduler_interval_secs() -> u64 {
    300
}

fn default_scheduler_batch_size() -> u64 {
    100
}

fn default_cooldown_minutes() -> i64 {
    15
}

fn default_freshness_hours() -> i64 {
    4
}

fn default_retry_window_minutes() -> i64 {
    60
}

fn default_max_backoff_hours() -> i64 {
    24
}

fn default_stale_lease_minutes() -> i64 {
    30
}

fn default_active_promotion_statuses() -> Vec<String> {
    vec![
        "AWAITING_METRICS".to_string(),
        "UNDER_REVIEW".to_string(),
        "APPROVED".to_string(),
    ]
}

fn default_harvester_poll_interval_secs() -> u64 {
    5
}

fn default_harvester_receive_batch() -> u64 {
    10
}

fn default_visibility_timeout_secs() -> i64 {
    120
}

fn default_max_deliveries() -> i32 {
    5
}

fn default_nack_delay_secs() -> i64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_done_retention_hours() -> i64 {
    24
}

fn default_dead_retention_days() -> i64 {
    7
}

fn default_purge_interval_secs() -> u64 {
    3600
}

fn default_analyzer_interval_secs() -> u64 {
    900
}

fn default_analyzer_batch_size() -> u64 {
    50
}

fn default_hourly_minute() -> u32 {
    5
}

fn default_daily_minute() -> u32 {
    15
}

fn default_threshold_name() -> String {
    "global_default".to_string()
}

fn default_min_samples() -> usize {
    10
}

fn default_lookback_days() -> i64 {
    30
}

fn default_level_a_multiplier() -> f64 {
    3.0
}

fn default_level_b_min_multiplier() -> f64 {
    2.0
}

fn default_level_b_max_multiplier() -> f64 {
    3.0
}

fn default_calibration_weekday() -> u32 {
    1
}

fn default_calibration_hour() -> u32 {
    1
}

fn default_settlement_interval_secs() -> u64 {
    600
}

fn default_settlement_batch_size() -> u64 {
    25
}

fn default_min_payout_idr() -> f64 {
    0.01
}

fn default_payout_formula() -> String {
    "views_only".to_string()
}

fn default_daily_rate_fee_idr() -> f64 {
    10.0
}

fn default_tiktok_api_base() -> String {
    "https://open.tiktokapis.com/v2".to_string()
}

fn default_instagram_api_base() -> String {
    "https://graph.facebook.com/v19.0".to_string()
}

fn default_youtube_api_base() -> String {
    "https://www.googleapis.com/youtube/v3".to_string()
}

// ============================================================
// Default implementations
// ============================================================

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            pool_size: default_database_pool_size(),
            timeout: default_database_timeout(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
            max_backups: default_max_backups(),
            enable_rotation: default_enable_rotation(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_scheduler_interval_secs(),
            batch_size: default_scheduler_batch_size(),
            cooldown_minutes: default_cooldown_minutes(),
            freshness_hours: default_freshness_hours(),
            retry_window_minutes: default_retry_window_minutes(),
            max_backoff_hours: default_max_backoff_hours(),
            stale_fetching_minutes: default_stale_lease_minutes(),
            active_promotion_statuses: default_active_promotion_statuses(),
        }
    }
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_harvester_poll_interval_secs(),
            receive_batch: default_harvester_receive_batch(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
            max_deliveries: default_max_deliveries(),
            nack_delay_secs: default_nack_delay_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            done_retention_hours: default_done_retention_hours(),
            dead_retention_days: default_dead_retention_days(),
            purge_interval_secs: default_purge_interval_secs(),
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_analyzer_interval_secs(),
            batch_size: default_analyzer_batch_size(),
            stale_analysis_minutes: default_stale_lease_minutes(),
        }
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            hourly_minute: default_hourly_minute(),
            daily_minute: default_daily_minute(),
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            threshold_name: default_threshold_name(),
            min_samples: default_min_samples(),
            lookback_days: default_lookback_days(),
            level_a_multiplier: default_level_a_multiplier(),
            level_b_min_multiplier: default_level_b_min_multiplier(),
            level_b_max_multiplier: default_level_b_max_multiplier(),
            weekday: default_calibration_weekday(),
            hour: default_calibration_hour(),
        }
    }
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_settlement_interval_secs(),
            batch_size: default_settlement_batch_size(),
            min_payout_idr: default_min_payout_idr(),
            formula: default_payout_formula(),
            like_weight: 0.0,
            comment_weight: 0.0,
            daily_rate_fee_idr: default_daily_rate_fee_idr(),
            daily_payout_enabled: true,
            stale_processing_minutes: default_stale_lease_minutes(),
        }
    }
}

impl Default for PlatformsConfig {
    fn default() -> Self {
        Self {
            tiktok_api_base: default_tiktok_api_base(),
            instagram_api_base: default_instagram_api_base(),
            youtube_api_base: default_youtube_api_base(),
            youtube_api_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_pipeline_policy() {
        let config = StaticConfig::default();
        assert_eq!(config.scheduler.batch_size, 100);
        assert_eq!(config.scheduler.cooldown_minutes, 15);
        assert_eq!(config.scheduler.freshness_hours, 4);
        assert_eq!(config.analyzer.batch_size, 50);
        assert_eq!(config.settlement.batch_size, 25);
        assert_eq!(config.calibration.min_samples, 10);
        assert_eq!(config.calibration.threshold_name, "global_default");
    }

    #[test]
    fn test_sample_config_round_trips_through_toml() {
        let sample = StaticConfig::generate_sample_config();
        let parsed: StaticConfig = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.settlement.formula, "views_only");
        assert_eq!(
            parsed.scheduler.active_promotion_statuses,
            default_active_promotion_statuses()
        );
    }

    #[test]
    fn test_default_aggregator_schedule_is_valid() {
        assert!(StaticConfig::default().validate().is_ok());
    }

    #[test]
    fn test_daily_rollup_must_follow_hourly_rollup() {
        let mut config = StaticConfig::default();
        config.aggregator.hourly_minute = 15;
        config.aggregator.daily_minute = 5;
        assert!(matches!(
            config.validate(),
            Err(PromoGuardError::Config(msg)) if msg.contains("daily_minute")
        ));

        config.aggregator.daily_minute = 15;
        assert!(config.validate().is_err());

        config.aggregator.hourly_minute = 5;
        config.aggregator.daily_minute = 75;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let parsed: StaticConfig = toml::from_str(
            r#"
            [scheduler]
            batch_size = 20
            "#,
        )
        .unwrap();
        assert_eq!(parsed.scheduler.batch_size, 20);
        assert_eq!(parsed.scheduler.cooldown_minutes, 15);
        assert_eq!(parsed.harvester.max_deliveries, 5);
    }
}
