//! 构建所有 worker
//!
//! 每个 worker 显式拿到共享的存储句柄和自己的配置段，不读全局配置。

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use tracing::{debug, info};

use crate::activity::{
    CalibrationOutcome, DailyActivityRollup, HourlyActivityRollup, RollupReport,
    ThresholdCalibrator,
};
use crate::config::StaticConfig;
use crate::fraud::{AnalyzerReport, ClassificationReport, PostAnalyzer, UserClassifier};
use crate::harvest::{
    DbHarvestQueue, DrainReport, HarvestPolicy, HarvestQueue, HarvestScheduler, MetricHarvester,
    ScheduleReport,
};
use crate::platforms::AdapterRegistry;
use crate::settlement::{DailySettlementReport, SettlementEngine, SettlementReport};
use crate::storage::SeaOrmStorage;

pub struct StartupContext {
    pub config: Arc<StaticConfig>,
    pub storage: Arc<SeaOrmStorage>,
    pub queue: Arc<dyn HarvestQueue>,
    pub scheduler: HarvestScheduler,
    pub harvester: MetricHarvester,
    pub analyzer: PostAnalyzer,
    pub hourly: HourlyActivityRollup,
    pub daily: DailyActivityRollup,
    pub classifier: UserClassifier,
    pub calibrator: ThresholdCalibrator,
    pub settlement: SettlementEngine,
}

/// 连接数据库（含迁移）并构建 worker
pub async fn prepare_workers(config: Arc<StaticConfig>) -> Result<StartupContext> {
    let start_time = std::time::Instant::now();

    let storage = Arc::new(
        SeaOrmStorage::new(&config.database)
            .await
            .context("Failed to initialize storage")?,
    );
    info!("Using storage backend: {}", storage.backend_name());

    let context = build_context(config, storage)?;
    debug!("Workers prepared in {:?}", start_time.elapsed());
    Ok(context)
}

/// 在已有存储上构建 worker
pub fn build_context(
    config: Arc<StaticConfig>,
    storage: Arc<SeaOrmStorage>,
) -> Result<StartupContext> {
    let queue: Arc<dyn HarvestQueue> = Arc::new(DbHarvestQueue::new(
        storage.clone(),
        config.harvester.max_deliveries,
    ));
    let registry = Arc::new(AdapterRegistry::from_config(
        &config.platforms,
        Duration::from_secs(config.harvester.request_timeout_secs),
    ));

    let settlement = SettlementEngine::new(storage.clone(), config.settlement.clone())
        .context("Invalid settlement configuration")?;

    Ok(StartupContext {
        scheduler: HarvestScheduler::new(storage.clone(), queue.clone(), config.scheduler.clone()),
        harvester: MetricHarvester::new(
            storage.clone(),
            registry,
            HarvestPolicy::from_config(&config.scheduler, &config.platforms),
        ),
        analyzer: PostAnalyzer::new(storage.clone(), config.analyzer.clone()),
        hourly: HourlyActivityRollup::new(storage.clone()),
        daily: DailyActivityRollup::new(storage.clone()),
        classifier: UserClassifier::new(storage.clone()),
        calibrator: ThresholdCalibrator::new(storage.clone(), config.calibration.clone()),
        settlement,
        queue,
        storage,
        config,
    })
}

impl StartupContext {
    pub async fn schedule(&self) -> Result<ScheduleReport> {
        self.scheduler
            .run_once(Utc::now())
            .await
            .context("Harvest scheduling failed")
    }

    pub async fn harvest(&self) -> Result<DrainReport> {
        self.harvester
            .drain_once(self.queue.as_ref(), &self.config.harvester)
            .await
            .context("Harvest queue drain failed")
    }

    /// 删除超过保留期的已完成消息和死信
    pub async fn purge_queue(&self) -> Result<u64> {
        let now = Utc::now();
        let harvester = &self.config.harvester;
        let deleted = self
            .queue
            .purge(
                now - ChronoDuration::hours(harvester.done_retention_hours),
                now - ChronoDuration::days(harvester.dead_retention_days),
            )
            .await
            .context("Harvest queue purge failed")?;
        if deleted > 0 {
            info!("Purged {} finished harvest queue messages", deleted);
        }
        Ok(deleted)
    }

    pub async fn analyze(&self) -> Result<AnalyzerReport> {
        self.analyzer
            .run_once(Utc::now())
            .await
            .context("Post analysis failed")
    }

    pub async fn rollup_hour(&self, hour_start: DateTime<Utc>) -> Result<RollupReport> {
        self.hourly
            .rollup_hour(hour_start)
            .await
            .with_context(|| format!("Hourly rollup for {} failed", hour_start))
    }

    /// 天级汇总 + 用户判定
    pub async fn rollup_day(&self, date: NaiveDate) -> Result<(RollupReport, ClassificationReport)> {
        let rollup = self
            .daily
            .rollup_day(date)
            .await
            .with_context(|| format!("Daily rollup for {} failed", date))?;
        let classification = self
            .classifier
            .classify_day(date)
            .await
            .with_context(|| format!("User classification for {} failed", date))?;
        Ok((rollup, classification))
    }

    pub async fn calibrate(&self) -> Result<CalibrationOutcome> {
        self.calibrator
            .calibrate(Utc::now())
            .await
            .context("Threshold calibration failed")
    }

    pub async fn settle(&self) -> Result<SettlementReport> {
        self.settlement
            .settle_pending_posts()
            .await
            .context("Post settlement failed")
    }

    pub async fn settle_day(&self, date: NaiveDate) -> Result<DailySettlementReport> {
        self.settlement
            .settle_day(date)
            .await
            .with_context(|| format!("Daily settlement for {} failed", date))
    }
}
