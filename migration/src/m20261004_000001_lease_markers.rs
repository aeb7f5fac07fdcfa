//! 租约与判定标记
//!
//! - promotion_posts: 添加 analysis_lease 列，分析结论只能由持有当前租约的 worker 写回
//! - user_daily_metrics: 添加 classified_at 列，标记机器人判定已完成
//! - harvest_queue: 添加 (status, updated_at) 索引，供已完成消息清理使用

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 1. promotion_posts 添加 analysis_lease 列
        manager
            .alter_table(
                Table::alter()
                    .table(PromotionPosts::Table)
                    .add_column(
                        ColumnDef::new(PromotionPosts::AnalysisLease)
                            .string_len(64)
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 2. user_daily_metrics 添加 classified_at 列
        manager
            .alter_table(
                Table::alter()
                    .table(UserDailyMetrics::Table)
                    .add_column(
                        ColumnDef::new(UserDailyMetrics::ClassifiedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 3. harvest_queue 清理按状态 + 更新时间扫描
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_harvest_queue_status_updated")
                    .table(HarvestQueue::Table)
                    .col(HarvestQueue::Status)
                    .col(HarvestQueue::UpdatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .if_exists()
                    .name("idx_harvest_queue_status_updated")
                    .table(HarvestQueue::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .alter_table(
                Table::alter()
                    .table(UserDailyMetrics::Table)
                    .drop_column(UserDailyMetrics::ClassifiedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .alter_table(
                Table::alter()
                    .table(PromotionPosts::Table)
                    .drop_column(PromotionPosts::AnalysisLease)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum PromotionPosts {
    #[sea_orm(iden = "promotion_posts")]
    Table,
    AnalysisLease,
}

#[derive(DeriveIden)]
enum UserDailyMetrics {
    #[sea_orm(iden = "user_daily_metrics")]
    Table,
    ClassifiedAt,
}

#[derive(DeriveIden)]
enum HarvestQueue {
    #[sea_orm(iden = "harvest_queue")]
    Table,
    Status,
    UpdatedAt,
}
