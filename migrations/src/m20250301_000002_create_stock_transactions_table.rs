use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Append-only movement ledger
        manager
            .create_table(
                Table::create()
                    .table(StockTransactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StockTransactions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(StockTransactions::ProductId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockTransactions::WarehouseId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockTransactions::LocationId)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(StockTransactions::Type)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockTransactions::QuantityDelta)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockTransactions::UnitCost)
                            .decimal_len(16, 2)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(StockTransactions::ReferenceType)
                            .string_len(50)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(StockTransactions::ReferenceId)
                            .string_len(100)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(StockTransactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockTransactions::CreatedByUserId)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(StockTransactions::CreatedByName)
                            .string_len(200)
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Movement and timeline scans
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_stock_transactions_product_warehouse_created")
                    .table(StockTransactions::Table)
                    .col(StockTransactions::ProductId)
                    .col(StockTransactions::WarehouseId)
                    .col(StockTransactions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_stock_transactions_created")
                    .table(StockTransactions::Table)
                    .col(StockTransactions::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StockTransactions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum StockTransactions {
    Table,
    Id,
    ProductId,
    WarehouseId,
    LocationId,
    Type,
    QuantityDelta,
    UnitCost,
    ReferenceType,
    ReferenceId,
    CreatedAt,
    CreatedByUserId,
    CreatedByName,
}
