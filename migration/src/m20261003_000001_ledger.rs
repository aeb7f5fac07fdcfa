//! 账本（transactions）表

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Transactions::UserId).string_len(64).not_null())
                    .col(ColumnDef::new(Transactions::TxType).string_len(32).not_null())
                    .col(ColumnDef::new(Transactions::AmountIdr).double().not_null())
                    .col(ColumnDef::new(Transactions::Description).text().null())
                    .col(
                        ColumnDef::new(Transactions::ReferenceId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::ReferenceType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::Status).string_len(32).not_null())
                    .col(
                        ColumnDef::new(Transactions::ProcessedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 幂等：同一引用对象最多一笔同类型交易
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_transactions_reference_unique")
                    .table(Transactions::Table)
                    .col(Transactions::ReferenceType)
                    .col(Transactions::ReferenceId)
                    .col(Transactions::TxType)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_transactions_user")
                    .table(Transactions::Table)
                    .col(Transactions::UserId)
                    .col(Transactions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Transactions {
    Table,
    Id,
    UserId,
    TxType,
    AmountIdr,
    Description,
    ReferenceId,
    ReferenceType,
    Status,
    ProcessedAt,
    CreatedAt,
}
