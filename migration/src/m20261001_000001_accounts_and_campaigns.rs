//! 用户、平台凭证、campaign 与 promotion 表
//!
//! 这些表由外部应用写入，流水线只读取或做增量更新。

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Users::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Users::Email).string_len(255).not_null())
                    .col(ColumnDef::new(Users::Name).string_len(255).null())
                    .col(
                        ColumnDef::new(Users::Status)
                            .string_len(32)
                            .not_null()
                            .default("ACTIVE"),
                    )
                    .col(
                        ColumnDef::new(Users::BalanceIdr)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Users::TotalEarnedIdr)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Users::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Users::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_users_email")
                    .table(Users::Table)
                    .col(Users::Email)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PlatformCredentials::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PlatformCredentials::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PlatformCredentials::UserId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PlatformCredentials::Provider)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(PlatformCredentials::AccessToken).text().null())
                    .col(ColumnDef::new(PlatformCredentials::RefreshToken).text().null())
                    .col(
                        ColumnDef::new(PlatformCredentials::ExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PlatformCredentials::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 凭证查找：(user_id, provider) 取最新一条
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_platform_credentials_user_provider")
                    .table(PlatformCredentials::Table)
                    .col(PlatformCredentials::UserId)
                    .col(PlatformCredentials::Provider)
                    .col(PlatformCredentials::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Campaigns::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Campaigns::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Campaigns::Title).string_len(255).not_null())
                    .col(
                        ColumnDef::new(Campaigns::RatePerViewerIdr)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Campaigns::Status)
                            .string_len(32)
                            .not_null()
                            .default("ACTIVE"),
                    )
                    .col(
                        ColumnDef::new(Campaigns::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Promotions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Promotions::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Promotions::CampaignId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Promotions::PromoterId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Promotions::Status)
                            .string_len(32)
                            .not_null()
                            .default("AWAITING_METRICS"),
                    )
                    .col(
                        ColumnDef::new(Promotions::CalculatedEarningsIdr)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Promotions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Promotions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_promotions_status")
                    .table(Promotions::Table)
                    .col(Promotions::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Promotions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Campaigns::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PlatformCredentials::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    Email,
    Name,
    Status,
    BalanceIdr,
    TotalEarnedIdr,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum PlatformCredentials {
    Table,
    Id,
    UserId,
    Provider,
    AccessToken,
    RefreshToken,
    ExpiresAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Campaigns {
    Table,
    Id,
    Title,
    RatePerViewerIdr,
    Status,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Promotions {
    Table,
    Id,
    CampaignId,
    PromoterId,
    Status,
    CalculatedEarningsIdr,
    CreatedAt,
    UpdatedAt,
}
