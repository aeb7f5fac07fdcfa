//! 抓取请求队列表
//!
//! 至少一次投递：消费者领取时写入租约到期时间，
//! 未确认的消息在租约过期后重新可见。

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(HarvestQueue::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(HarvestQueue::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(HarvestQueue::Payload).text().not_null())
                    .col(
                        ColumnDef::new(HarvestQueue::Status)
                            .string_len(16)
                            .not_null()
                            .default("PENDING"),
                    )
                    .col(
                        ColumnDef::new(HarvestQueue::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(HarvestQueue::AvailableAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(HarvestQueue::LastError).text().null())
                    .col(
                        ColumnDef::new(HarvestQueue::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(HarvestQueue::UpdatedAt)
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
                    .name("idx_harvest_queue_status_available")
                    .table(HarvestQueue::Table)
                    .col(HarvestQueue::Status)
                    .col(HarvestQueue::AvailableAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(HarvestQueue::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum HarvestQueue {
    Table,
    Id,
    Payload,
    Status,
    Attempts,
    AvailableAt,
    LastError,
    CreatedAt,
    UpdatedAt,
}
