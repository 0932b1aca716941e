use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::{
    clock::Clock,
    entities::{product, warehouse},
    errors::ServiceError,
    models::ValuationMode,
    services::{
        stock_read::{DeadStockQuery, LowStockQuery, StockReadService},
        valuation::{ValuationQuery, ValuationService},
    },
};

/// Headline counts for the inventory dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DashboardSummary {
    pub total_products: u64,
    pub active_products: u64,
    pub total_warehouses: u64,
    pub active_warehouses: u64,
    /// Balances at or below their product's minimum level
    pub low_stock_items: u64,
    /// Positive balances idle for the default dead-stock window
    pub dead_stock_items: u64,
    /// FIFO value of all stock on hand
    #[schema(value_type = String)]
    pub total_stock_value: Decimal,
    pub generated_at: DateTime<Utc>,
}

/// Summarizes catalog size and stock health from the report reads
#[derive(Clone)]
pub struct DashboardService {
    db: Arc<DatabaseConnection>,
    clock: Arc<dyn Clock>,
    stock_read: StockReadService,
    valuation: ValuationService,
}

impl DashboardService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        clock: Arc<dyn Clock>,
        stock_read: StockReadService,
        valuation: ValuationService,
    ) -> Self {
        Self {
            db,
            clock,
            stock_read,
            valuation,
        }
    }

    #[instrument(skip(self))]
    pub async fn summary(&self) -> Result<DashboardSummary, ServiceError> {
        let db = &*self.db;

        let total_products = product::Entity::find().count(db).await?;
        let active_products = product::Entity::find()
            .filter(product::Column::IsActive.eq(true))
            .count(db)
            .await?;
        let total_warehouses = warehouse::Entity::find().count(db).await?;
        let active_warehouses = warehouse::Entity::find()
            .filter(warehouse::Column::IsActive.eq(true))
            .count(db)
            .await?;

        let low_stock = self.stock_read.low_stock(LowStockQuery::default()).await?;
        let dead_stock = self.stock_read.dead_stock(DeadStockQuery::default()).await?;
        let valuation = self
            .valuation
            .stock_valuation(ValuationQuery {
                mode: Some(ValuationMode::Fifo),
                ..Default::default()
            })
            .await?;
        let total_stock_value = sum_values(valuation.iter().map(|row| row.total_value))?;

        info!(
            total_products,
            low_stock_items = low_stock.len(),
            dead_stock_items = dead_stock.len(),
            "Dashboard summary generated"
        );

        Ok(DashboardSummary {
            total_products,
            active_products,
            total_warehouses,
            active_warehouses,
            low_stock_items: low_stock.len() as u64,
            dead_stock_items: dead_stock.len() as u64,
            total_stock_value,
            generated_at: self.clock.now(),
        })
    }
}

fn sum_values(values: impl IntoIterator<Item = Decimal>) -> Result<Decimal, ServiceError> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |total, value| total.checked_add(value))
        .ok_or_else(|| ServiceError::InternalError("Total stock value overflowed.".to_string()))
}
