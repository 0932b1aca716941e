use std::{collections::HashMap, sync::Arc};

use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use utoipa::{IntoParams, ToSchema};

use crate::{
    entities::{
        stock_balance,
        stock_transaction::{self, TransactionType},
    },
    errors::ServiceError,
    models::{CostLayer, ValuationMode},
    services::stock_read::CatalogLookup,
};

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ValuationQuery {
    /// `fifo` (default) or `weighted_average`
    pub mode: Option<ValuationMode>,
    pub warehouse_id: Option<i32>,
    pub product_id: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ValuationRow {
    pub product_id: i32,
    pub product_name: String,
    pub sku: String,
    pub warehouse_id: i32,
    pub warehouse_code: String,
    pub location_id: Option<i32>,
    pub location_code: Option<String>,
    pub quantity_on_hand: i32,
    #[schema(value_type = Option<String>)]
    pub unit_cost: Option<Decimal>,
    #[schema(value_type = String)]
    pub total_value: Decimal,
}

/// Values positive balances against the receipt cost layers of their product and warehouse.
#[derive(Clone)]
pub struct ValuationService {
    db: Arc<DatabaseConnection>,
}

impl ValuationService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Rows sorted by total value, highest first
    #[instrument(skip(self))]
    pub async fn stock_valuation(
        &self,
        query: ValuationQuery,
    ) -> Result<Vec<ValuationRow>, ServiceError> {
        let mode = query.mode.unwrap_or_default();

        let mut select =
            stock_balance::Entity::find().filter(stock_balance::Column::QuantityOnHand.gt(0));
        if let Some(warehouse_id) = query.warehouse_id {
            select = select.filter(stock_balance::Column::WarehouseId.eq(warehouse_id));
        }
        if let Some(product_id) = query.product_id {
            select = select.filter(stock_balance::Column::ProductId.eq(product_id));
        }
        let balances = select.all(&*self.db).await?;
        let lookup = CatalogLookup::for_balances(&*self.db, &balances).await?;

        let mut layers_by_pair: HashMap<(i32, i32), Vec<CostLayer>> = HashMap::new();
        let mut rows = Vec::with_capacity(balances.len());
        for balance in balances {
            let pair = (balance.product_id, balance.warehouse_id);
            if !layers_by_pair.contains_key(&pair) {
                let layers = self.cost_layers(pair.0, pair.1).await?;
                layers_by_pair.insert(pair, layers);
            }
            let layers = layers_by_pair
                .get(&pair)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let valuation = mode.value(balance.quantity_on_hand, layers);

            rows.push(ValuationRow {
                product_id: balance.product_id,
                product_name: lookup.product_name(balance.product_id),
                sku: lookup.sku(balance.product_id),
                warehouse_id: balance.warehouse_id,
                warehouse_code: lookup.warehouse_code(balance.warehouse_id),
                location_id: balance.location_id,
                location_code: lookup.location_code(balance.location_id),
                quantity_on_hand: balance.quantity_on_hand,
                unit_cost: valuation.unit_cost,
                total_value: valuation.total_value,
            });
        }

        rows.sort_by(|a, b| {
            b.total_value
                .cmp(&a.total_value)
                .then(a.product_id.cmp(&b.product_id))
                .then(a.warehouse_id.cmp(&b.warehouse_id))
                .then(a.location_id.cmp(&b.location_id))
        });
        debug!(%mode, rows = rows.len(), "Stock valuation computed");
        Ok(rows)
    }

    /// Costed receipts for a product in a warehouse, oldest first
    async fn cost_layers(
        &self,
        product_id: i32,
        warehouse_id: i32,
    ) -> Result<Vec<CostLayer>, ServiceError> {
        let receipts = stock_transaction::Entity::find()
            .filter(stock_transaction::Column::ProductId.eq(product_id))
            .filter(stock_transaction::Column::WarehouseId.eq(warehouse_id))
            .filter(stock_transaction::Column::TransactionType.eq(TransactionType::In))
            .filter(stock_transaction::Column::UnitCost.is_not_null())
            .filter(stock_transaction::Column::QuantityDelta.gt(0))
            .order_by_asc(stock_transaction::Column::CreatedAt)
            .order_by_asc(stock_transaction::Column::Id)
            .all(&*self.db)
            .await?;

        Ok(receipts
            .into_iter()
            .filter_map(|tx| {
                tx.unit_cost
                    .map(|cost| CostLayer::new(tx.quantity_delta, cost))
            })
            .collect())
    }
}
