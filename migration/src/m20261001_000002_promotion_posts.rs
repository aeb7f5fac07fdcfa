//! 推广帖子与指标快照表

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PromotionPosts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PromotionPosts::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PromotionPosts::PromotionId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PromotionPosts::Platform)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(PromotionPosts::PostUrl).text().not_null())
                    .col(
                        ColumnDef::new(PromotionPosts::ExternalPostId)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PromotionPosts::FetchStatus)
                            .string_len(32)
                            .not_null()
                            .default("NOT_FETCHED"),
                    )
                    .col(
                        ColumnDef::new(PromotionPosts::BotAnalysisStatus)
                            .string_len(32)
                            .not_null()
                            .default("NOT_ANALYZED"),
                    )
                    .col(
                        ColumnDef::new(PromotionPosts::SettlementStatus)
                            .string_len(32)
                            .not_null()
                            .default("UNPAID"),
                    )
                    .col(
                        ColumnDef::new(PromotionPosts::LastCheckedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PromotionPosts::NextCheckAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PromotionPosts::ConsecutiveFailures)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PromotionPosts::ErrorMessage)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PromotionPosts::BotAnalysisReason)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PromotionPosts::BotSuspicionScore)
                            .double()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PromotionPosts::BotAnalysisDetails)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PromotionPosts::AnalyzedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PromotionPosts::PayoutTransactionId)
                            .string_len(64)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PromotionPosts::CalculatedEarningsIdr)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(PromotionPosts::SubmittedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PromotionPosts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 调度器扫描：按抓取状态 + 下次检查时间过滤
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_promotion_posts_fetch_schedule")
                    .table(PromotionPosts::Table)
                    .col(PromotionPosts::FetchStatus)
                    .col(PromotionPosts::NextCheckAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_promotion_posts_analysis")
                    .table(PromotionPosts::Table)
                    .col(PromotionPosts::BotAnalysisStatus)
                    .col(PromotionPosts::SettlementStatus)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_promotion_posts_promotion")
                    .table(PromotionPosts::Table)
                    .col(PromotionPosts::PromotionId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PlatformMetricSnapshots::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PlatformMetricSnapshots::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PlatformMetricSnapshots::PromotionPostId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PlatformMetricSnapshots::FetchedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PlatformMetricSnapshots::Views)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PlatformMetricSnapshots::Likes)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PlatformMetricSnapshots::Comments)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PlatformMetricSnapshots::Shares)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PlatformMetricSnapshots::RawPayload)
                            .text()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 时间序列读取：(post, fetched_at)，不加唯一约束（允许重投产生的重复快照）
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_snapshots_post_fetched")
                    .table(PlatformMetricSnapshots::Table)
                    .col(PlatformMetricSnapshots::PromotionPostId)
                    .col(PlatformMetricSnapshots::FetchedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PlatformMetricSnapshots::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PromotionPosts::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum PromotionPosts {
    Table,
    Id,
    PromotionId,
    Platform,
    PostUrl,
    ExternalPostId,
    FetchStatus,
    BotAnalysisStatus,
    SettlementStatus,
    LastCheckedAt,
    NextCheckAt,
    ConsecutiveFailures,
    ErrorMessage,
    BotAnalysisReason,
    BotSuspicionScore,
    BotAnalysisDetails,
    AnalyzedAt,
    PayoutTransactionId,
    CalculatedEarningsIdr,
    SubmittedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum PlatformMetricSnapshots {
    Table,
    Id,
    PromotionPostId,
    FetchedAt,
    Views,
    Likes,
    Comments,
    Shares,
    RawPayload,
}
