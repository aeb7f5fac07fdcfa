//! 常驻模式：每个任务一个 tokio task，Ctrl+C 退出

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::schedule::Schedule;
use super::startup::StartupContext;
use crate::utils::{previous_day, previous_hour};

/// 按计划循环执行一个任务；单次失败只记录日志
fn spawn_job<F, Fut>(name: &'static str, schedule: Schedule, job: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    info!("Job '{}' scheduled {}", name, schedule);
    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let next = schedule.next_after(now);
            let wait = (next - now).to_std().unwrap_or_default();
            debug!("Job '{}' next run at {}", name, next);
            tokio::time::sleep(wait).await;

            if let Err(e) = job().await {
                error!("Job '{}' failed: {:#}", name, e);
            }
        }
    })
}

/// 队列消费循环：有消息时连续消费，空队列时按轮询间隔休眠
fn spawn_harvester(ctx: Arc<StartupContext>) -> JoinHandle<()> {
    let idle = Duration::from_secs(ctx.config.harvester.poll_interval_secs.max(1));
    info!("Harvester consuming queue (idle poll {}s)", idle.as_secs());
    tokio::spawn(async move {
        loop {
            match ctx.harvest().await {
                Ok(report) if report.received > 0 => {
                    debug!(
                        "Harvester drained {} messages ({} acked, {} nacked)",
                        report.received, report.acked, report.nacked
                    );
                }
                Ok(_) => tokio::time::sleep(idle).await,
                Err(e) => {
                    error!("Harvester loop error: {:#}", e);
                    tokio::time::sleep(idle).await;
                }
            }
        }
    })
}

pub async fn run_daemon(ctx: StartupContext) -> Result<()> {
    let ctx = Arc::new(ctx);
    let config = ctx.config.clone();
    let mut handles = Vec::new();

    let c = ctx.clone();
    handles.push(spawn_job(
        "harvest-scheduler",
        Schedule::Every(Duration::from_secs(config.scheduler.interval_secs.max(1))),
        move || {
            let c = c.clone();
            async move { c.schedule().await.map(|_| ()) }
        },
    ));

    handles.push(spawn_harvester(ctx.clone()));

    let c = ctx.clone();
    handles.push(spawn_job(
        "queue-retention",
        Schedule::Every(Duration::from_secs(config.harvester.purge_interval_secs.max(1))),
        move || {
            let c = c.clone();
            async move { c.purge_queue().await.map(|_| ()) }
        },
    ));

    let c = ctx.clone();
    handles.push(spawn_job(
        "post-analyzer",
        Schedule::Every(Duration::from_secs(config.analyzer.interval_secs.max(1))),
        move || {
            let c = c.clone();
            async move { c.analyze().await.map(|_| ()) }
        },
    ));

    let c = ctx.clone();
    handles.push(spawn_job(
        "hourly-rollup",
        Schedule::Hourly {
            minute: config.aggregator.hourly_minute,
        },
        move || {
            let c = c.clone();
            async move { c.rollup_hour(previous_hour(Utc::now())).await.map(|_| ()) }
        },
    ));

    // 天级汇总 → 用户判定 → 日活动结算，顺序执行
    let c = ctx.clone();
    handles.push(spawn_job(
        "daily-rollup",
        Schedule::Daily {
            hour: 0,
            minute: config.aggregator.daily_minute,
        },
        move || {
            let c = c.clone();
            async move {
                let date = previous_day(Utc::now());
                c.rollup_day(date).await?;
                c.settle_day(date).await?;
                Ok(())
            }
        },
    ));

    let c = ctx.clone();
    handles.push(spawn_job(
        "threshold-calibration",
        Schedule::Weekly {
            weekday: config.calibration.weekday,
            hour: config.calibration.hour,
            minute: 0,
        },
        move || {
            let c = c.clone();
            async move { c.calibrate().await.map(|_| ()) }
        },
    ));

    let c = ctx.clone();
    handles.push(spawn_job(
        "settlement",
        Schedule::Every(Duration::from_secs(config.settlement.interval_secs.max(1))),
        move || {
            let c = c.clone();
            async move { c.settle().await.map(|_| ()) }
        },
    ));

    info!("promoguard daemon started with {} tasks", handles.len());

    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, stopping jobs..."),
        Err(e) => warn!(
            "Failed to listen for Ctrl+C: {}. Proceeding with shutdown anyway.",
            e
        ),
    }

    for handle in &handles {
        handle.abort();
    }
    for handle in handles {
        let _ = handle.await;
    }
    ctx.storage.get_db().clone().close().await.ok();
    info!("promoguard daemon stopped");
    Ok(())
}
