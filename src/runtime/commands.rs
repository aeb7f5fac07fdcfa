//! 单次命令执行

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use colored::Colorize;
use tracing::info;

use super::daemon::run_daemon;
use super::startup::prepare_workers;
use crate::cli::{Commands, ConfigCommands};
use crate::config::StaticConfig;
use crate::utils::{parse_date, parse_hour, previous_day, previous_hour};

const DEFAULT_SAMPLE_PATH: &str = "config.example.toml";

/// 写出示例配置（不需要数据库）
pub fn generate_config(output_path: Option<&str>, force: bool) -> Result<()> {
    let path = output_path.unwrap_or(DEFAULT_SAMPLE_PATH);
    if Path::new(path).exists() && !force {
        bail!("{} already exists, pass --force to overwrite", path);
    }
    std::fs::write(path, StaticConfig::generate_sample_config())
        .with_context(|| format!("Failed to write {}", path))?;
    println!("{} Sample configuration written to {}", "✓".green(), path);
    Ok(())
}

pub async fn run_command(command: Commands, config: Arc<StaticConfig>) -> Result<()> {
    if let Commands::Config {
        action: ConfigCommands::Generate { output_path, force },
    } = &command
    {
        return generate_config(output_path.as_deref(), *force);
    }

    let ctx = prepare_workers(config).await?;

    match command {
        Commands::Run => run_daemon(ctx).await?,
        Commands::Schedule => {
            let report = ctx.schedule().await?;
            println!(
                "Enqueued {} of {} due posts",
                report.enqueued, report.scanned
            );
        }
        Commands::Harvest => {
            let report = ctx.harvest().await?;
            println!(
                "Received {} messages: {} acked, {} nacked",
                report.received, report.acked, report.nacked
            );
        }
        Commands::PurgeQueue => {
            let deleted = ctx.purge_queue().await?;
            println!("Deleted {} finished queue messages", deleted);
        }
        Commands::Analyze => {
            let report = ctx.analyze().await?;
            println!(
                "Analyzed {} posts: {} bot likely, {} suspicious, {} skipped",
                report.analyzed, report.bot_likely, report.suspicious, report.skipped
            );
        }
        Commands::RollupHourly { hour } => {
            let hour_start = match hour {
                Some(h) => parse_hour(&h)?,
                None => previous_hour(Utc::now()),
            };
            let report = ctx.rollup_hour(hour_start).await?;
            println!(
                "Hour {}: {} users, {} activities",
                hour_start, report.users, report.activities
            );
        }
        Commands::RollupDaily { date } => {
            let date = match date {
                Some(d) => parse_date(&d)?,
                None => previous_day(Utc::now()),
            };
            let (rollup, classification) = ctx.rollup_day(date).await?;
            println!(
                "Day {}: {} users rolled up, {} classified ({} warned, {} banned)",
                date,
                rollup.users,
                classification.classified,
                classification.warned,
                classification.banned
            );
        }
        Commands::Calibrate => {
            let outcome = ctx.calibrate().await?;
            println!("{:?}", outcome);
        }
        Commands::Settle => {
            let report = ctx.settle().await?;
            println!(
                "Settled {} posts: {} paid ({:.2} IDR), {} zero, {} rejected, {} errors",
                report.selected,
                report.paid,
                report.total_paid_idr,
                report.zero_payout,
                report.rejected,
                report.errors
            );
        }
        Commands::SettleDaily { date } => {
            let date = match date {
                Some(d) => parse_date(&d)?,
                None => previous_day(Utc::now()),
            };
            let report = ctx.settle_day(date).await?;
            println!(
                "Day {}: {} paid ({:.2} IDR), {} skipped, {} awaiting detection",
                date, report.paid, report.total_paid_idr, report.skipped, report.awaiting_detection
            );
        }
        Commands::Migrate => {
            info!("Migrations applied on {}", ctx.storage.backend_name());
            println!("{} Database is up to date", "✓".green());
        }
        Commands::Config { .. } => {}
    }
    Ok(())
}
