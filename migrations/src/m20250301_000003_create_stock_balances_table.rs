use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(StockBalances::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StockBalances::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(StockBalances::ProductId).integer().not_null())
                    .col(
                        ColumnDef::new(StockBalances::WarehouseId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(StockBalances::LocationId).integer().null())
                    .col(
                        ColumnDef::new(StockBalances::TripleKey)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockBalances::QuantityOnHand)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(StockBalances::Version)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(StockBalances::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockBalances::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockBalances::UpdatedByUserId)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(StockBalances::UpdatedByName)
                            .string_len(200)
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // One row per (product, warehouse, location), including the NULL-location row
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_stock_balances_triple_key")
                    .table(StockBalances::Table)
                    .col(StockBalances::TripleKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_stock_balances_product_warehouse_location")
                    .table(StockBalances::Table)
                    .col(StockBalances::ProductId)
                    .col(StockBalances::WarehouseId)
                    .col(StockBalances::LocationId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StockBalances::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum StockBalances {
    Table,
    Id,
    ProductId,
    WarehouseId,
    LocationId,
    TripleKey,
    QuantityOnHand,
    Version,
    CreatedAt,
    UpdatedAt,
    UpdatedByUserId,
    UpdatedByName,
}
