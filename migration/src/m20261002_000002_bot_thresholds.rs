//! 机器人检测阈值表
//!
//! 同时写入三条初始阈值：
//! - `global_default`：用户级每分钟活动量分布（每周重新校准）
//! - `like_view_ratio_default`：帖子点赞/播放比上下限
//! - `daily_view_increase_default`：帖子日均播放增长

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// (name, metric_type, mean, std_dev, lower_bound, upper_bound, description)
type SeedRow = (
    &'static str,
    Option<&'static str>,
    f64,
    f64,
    Option<f64>,
    Option<f64>,
    &'static str,
);

const SEED_THRESHOLDS: [SeedRow; 3] = [
    (
        "global_default",
        None,
        10.0,
        2.0,
        None,
        None,
        "Average activities per minute across normal users",
    ),
    (
        "like_view_ratio_default",
        Some("LIKE_VIEW_RATIO"),
        0.05,
        0.02,
        Some(0.005),
        Some(0.5),
        "Acceptable like/view ratio band",
    ),
    (
        "daily_view_increase_default",
        Some("DAILY_VIEW_INCREASE"),
        5000.0,
        2000.0,
        None,
        Some(500_000.0),
        "Average daily view growth of a post",
    ),
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BotThresholds::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BotThresholds::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BotThresholds::Name).string_len(100).not_null())
                    .col(ColumnDef::new(BotThresholds::Platform).string_len(32).null())
                    .col(
                        ColumnDef::new(BotThresholds::MetricType)
                            .string_len(32)
                            .null(),
                    )
                    .col(ColumnDef::new(BotThresholds::Mean).double().not_null())
                    .col(ColumnDef::new(BotThresholds::StdDev).double().not_null())
                    .col(ColumnDef::new(BotThresholds::LowerBound).double().null())
                    .col(ColumnDef::new(BotThresholds::UpperBound).double().null())
                    .col(
                        ColumnDef::new(BotThresholds::LevelAMultiplier)
                            .double()
                            .not_null()
                            .default(3.0),
                    )
                    .col(
                        ColumnDef::new(BotThresholds::LevelBMinMultiplier)
                            .double()
                            .not_null()
                            .default(2.0),
                    )
                    .col(
                        ColumnDef::new(BotThresholds::LevelBMaxMultiplier)
                            .double()
                            .not_null()
                            .default(3.0),
                    )
                    .col(
                        ColumnDef::new(BotThresholds::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(BotThresholds::Version)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(ColumnDef::new(BotThresholds::SampleSize).integer().null())
                    .col(ColumnDef::new(BotThresholds::Description).text().null())
                    .col(
                        ColumnDef::new(BotThresholds::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 唯一索引：(name, version)，历史版本保留
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_bot_thresholds_name_version")
                    .table(BotThresholds::Table)
                    .col(BotThresholds::Name)
                    .col(BotThresholds::Version)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_bot_thresholds_active")
                    .table(BotThresholds::Table)
                    .col(BotThresholds::IsActive)
                    .col(BotThresholds::MetricType)
                    .to_owned(),
            )
            .await?;

        let mut insert = Query::insert();
        insert.into_table(BotThresholds::Table).columns([
            BotThresholds::Name,
            BotThresholds::MetricType,
            BotThresholds::Mean,
            BotThresholds::StdDev,
            BotThresholds::LowerBound,
            BotThresholds::UpperBound,
            BotThresholds::LevelAMultiplier,
            BotThresholds::LevelBMinMultiplier,
            BotThresholds::LevelBMaxMultiplier,
            BotThresholds::IsActive,
            BotThresholds::Version,
            BotThresholds::Description,
            BotThresholds::UpdatedAt,
        ]);
        for (name, metric_type, mean, std_dev, lower, upper, description) in SEED_THRESHOLDS {
            insert
                .values([
                    name.into(),
                    metric_type.into(),
                    mean.into(),
                    std_dev.into(),
                    lower.into(),
                    upper.into(),
                    3.0.into(),
                    2.0.into(),
                    3.0.into(),
                    true.into(),
                    1.into(),
                    description.into(),
                    Expr::current_timestamp().into(),
                ])
                .map_err(|e| DbErr::Migration(format!("invalid threshold seed: {}", e)))?;
        }
        manager.get_connection().execute(&insert).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BotThresholds::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum BotThresholds {
    Table,
    Id,
    Name,
    Platform,
    MetricType,
    Mean,
    StdDev,
    LowerBound,
    UpperBound,
    LevelAMultiplier,
    LevelBMinMultiplier,
    LevelBMaxMultiplier,
    IsActive,
    Version,
    SampleSize,
    Description,
    UpdatedAt,
}
