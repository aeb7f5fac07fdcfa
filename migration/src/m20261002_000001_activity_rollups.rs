//! 原始活动日志与用户小时 / 天级汇总表

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ActivityLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ActivityLogs::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ActivityLogs::UserId).string_len(64).null())
                    .col(
                        ColumnDef::new(ActivityLogs::PromotionId)
                            .string_len(64)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ActivityLogs::ActivityType)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ActivityLogs::IpAddress).string_len(45).null())
                    .col(ColumnDef::new(ActivityLogs::UserAgent).text().null())
                    .col(
                        ColumnDef::new(ActivityLogs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 小时汇总按时间窗口扫描
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_activity_logs_created_at")
                    .table(ActivityLogs::Table)
                    .col(ActivityLogs::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserHourlyActivity::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserHourlyActivity::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(UserHourlyActivity::UserId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserHourlyActivity::HourStart)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserHourlyActivity::TotalViews)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(UserHourlyActivity::TotalLikes)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(UserHourlyActivity::TotalComments)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(UserHourlyActivity::TotalActivities)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(UserHourlyActivity::AverageActivitiesPerMinute)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(UserHourlyActivity::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 唯一索引：(user_id, hour_start)，upsert 的冲突目标
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_user_hourly_activity_unique")
                    .table(UserHourlyActivity::Table)
                    .col(UserHourlyActivity::UserId)
                    .col(UserHourlyActivity::HourStart)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_user_hourly_activity_hour")
                    .table(UserHourlyActivity::Table)
                    .col(UserHourlyActivity::HourStart)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserDailyMetrics::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserDailyMetrics::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(UserDailyMetrics::UserId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(UserDailyMetrics::Date).date().not_null())
                    .col(
                        ColumnDef::new(UserDailyMetrics::TotalViews)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(UserDailyMetrics::TotalLikes)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(UserDailyMetrics::TotalComments)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(UserDailyMetrics::TotalActivities)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(UserDailyMetrics::AverageActivitiesPerMinute)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(UserDailyMetrics::BotDetectionLevel)
                            .string_len(32)
                            .not_null()
                            .default("NORMAL"),
                    )
                    .col(
                        ColumnDef::new(UserDailyMetrics::BotDetectionReason)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(UserDailyMetrics::IsPayoutAllowed)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(UserDailyMetrics::TotalPayoutIdr)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(UserDailyMetrics::PayoutStatus)
                            .string_len(32)
                            .not_null()
                            .default("UNPAID"),
                    )
                    .col(
                        ColumnDef::new(UserDailyMetrics::PayoutTransactionId)
                            .string_len(64)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(UserDailyMetrics::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 唯一索引：(user_id, date)
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_user_daily_metrics_unique")
                    .table(UserDailyMetrics::Table)
                    .col(UserDailyMetrics::UserId)
                    .col(UserDailyMetrics::Date)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_user_daily_metrics_date")
                    .table(UserDailyMetrics::Table)
                    .col(UserDailyMetrics::Date)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserDailyMetrics::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(UserHourlyActivity::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ActivityLogs::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum ActivityLogs {
    Table,
    Id,
    UserId,
    PromotionId,
    ActivityType,
    IpAddress,
    UserAgent,
    CreatedAt,
}

#[derive(DeriveIden)]
enum UserHourlyActivity {
    Table,
    Id,
    UserId,
    HourStart,
    TotalViews,
    TotalLikes,
    TotalComments,
    TotalActivities,
    AverageActivitiesPerMinute,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum UserDailyMetrics {
    Table,
    Id,
    UserId,
    Date,
    TotalViews,
    TotalLikes,
    TotalComments,
    TotalActivities,
    AverageActivitiesPerMinute,
    BotDetectionLevel,
    BotDetectionReason,
    IsPayoutAllowed,
    TotalPayoutIdr,
    PayoutStatus,
    PayoutTransactionId,
    UpdatedAt,
}
