//! Read-only stock reports built from balance snapshots and the movement ledger.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
    time::Duration as StdDuration,
};

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use utoipa::{IntoParams, ToSchema};

use crate::{
    cache::{get_json, set_json, CacheBackend, CacheGeneration},
    clock::Clock,
    config::LedgerConfig,
    entities::{
        location, product,
        stock_balance,
        stock_transaction::{self, TransactionType},
        warehouse,
    },
    errors::ServiceError,
    services::{resolve_paging, Page},
};

pub const STOCK_OVERVIEW_CACHE_PREFIX: &str = "stock-overview";

const MAX_DEAD_STOCK_DAYS: i64 = 3650;
const TIMELINE_DEFAULT_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct StockOverviewQuery {
    pub warehouse_id: Option<i32>,
    pub product_id: Option<i32>,
    /// Only rows at or below the product's minimum stock level
    #[serde(default)]
    pub low_stock_only: bool,
}

#[derive(Debug, Clone, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct StockMovementsQuery {
    pub from_utc: DateTime<Utc>,
    pub to_utc: DateTime<Utc>,
    pub warehouse_id: Option<i32>,
    pub product_id: Option<i32>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ProductTimelineQuery {
    pub from_utc: Option<DateTime<Utc>>,
    pub to_utc: Option<DateTime<Utc>>,
    pub warehouse_id: Option<i32>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct LowStockQuery {
    pub warehouse_id: Option<i32>,
    pub product_id: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct DeadStockQuery {
    /// Days without movement, 1 to 3650
    pub days: Option<i64>,
    pub warehouse_id: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StockOverviewRow {
    pub product_id: i32,
    pub product_name: String,
    pub sku: String,
    pub warehouse_id: i32,
    pub warehouse_code: String,
    pub location_id: Option<i32>,
    pub location_code: Option<String>,
    pub quantity_on_hand: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StockMovementRow {
    pub transaction_id: i32,
    pub product_id: i32,
    pub product_name: String,
    pub sku: String,
    pub warehouse_id: i32,
    pub warehouse_code: String,
    pub location_id: Option<i32>,
    pub location_code: Option<String>,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub quantity_delta: i32,
    #[schema(value_type = Option<String>)]
    pub unit_cost: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LowStockRow {
    pub product_id: i32,
    pub product_name: String,
    pub sku: String,
    pub warehouse_id: i32,
    pub warehouse_code: String,
    pub location_id: Option<i32>,
    pub location_code: Option<String>,
    pub quantity_on_hand: i32,
    pub min_stock_level: i32,
    pub shortage: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DeadStockRow {
    pub product_id: i32,
    pub product_name: String,
    pub sku: String,
    pub warehouse_id: i32,
    pub warehouse_code: String,
    pub location_id: Option<i32>,
    pub location_code: Option<String>,
    pub quantity_on_hand: i32,
    pub last_movement_at: Option<DateTime<Utc>>,
    pub days_since_last_movement: i64,
}

/// Product, warehouse and location rows needed to label report lines
#[derive(Debug, Default)]
pub(crate) struct CatalogLookup {
    products: HashMap<i32, product::Model>,
    warehouses: HashMap<i32, warehouse::Model>,
    locations: HashMap<i32, location::Model>,
}

impl CatalogLookup {
    pub(crate) async fn load<C: ConnectionTrait>(
        conn: &C,
        product_ids: impl IntoIterator<Item = i32>,
        warehouse_ids: impl IntoIterator<Item = i32>,
        location_ids: impl IntoIterator<Item = i32>,
    ) -> Result<Self, ServiceError> {
        let product_ids: BTreeSet<i32> = product_ids.into_iter().collect();
        let warehouse_ids: BTreeSet<i32> = warehouse_ids.into_iter().collect();
        let location_ids: BTreeSet<i32> = location_ids.into_iter().collect();

        let mut lookup = Self::default();
        if !product_ids.is_empty() {
            lookup.products = product::Entity::find()
                .filter(product::Column::Id.is_in(product_ids))
                .all(conn)
                .await?
                .into_iter()
                .map(|p| (p.id, p))
                .collect();
        }
        if !warehouse_ids.is_empty() {
            lookup.warehouses = warehouse::Entity::find()
                .filter(warehouse::Column::Id.is_in(warehouse_ids))
                .all(conn)
                .await?
                .into_iter()
                .map(|w| (w.id, w))
                .collect();
        }
        if !location_ids.is_empty() {
            lookup.locations = location::Entity::find()
                .filter(location::Column::Id.is_in(location_ids))
                .all(conn)
                .await?
                .into_iter()
                .map(|l| (l.id, l))
                .collect();
        }
        Ok(lookup)
    }

    pub(crate) async fn for_balances<C: ConnectionTrait>(
        conn: &C,
        balances: &[stock_balance::Model],
    ) -> Result<Self, ServiceError> {
        Self::load(
            conn,
            balances.iter().map(|b| b.product_id),
            balances.iter().map(|b| b.warehouse_id),
            balances.iter().filter_map(|b| b.location_id),
        )
        .await
    }

    pub(crate) fn product_name(&self, id: i32) -> String {
        self.products
            .get(&id)
            .map(|p| p.name.clone())
            .unwrap_or_default()
    }

    pub(crate) fn sku(&self, id: i32) -> String {
        self.products
            .get(&id)
            .map(|p| p.sku.clone())
            .unwrap_or_default()
    }

    pub(crate) fn min_stock_level(&self, id: i32) -> i32 {
        self.products.get(&id).map_or(0, |p| p.min_stock_level)
    }

    pub(crate) fn warehouse_code(&self, id: i32) -> String {
        self.warehouses
            .get(&id)
            .map(|w| w.code.clone())
            .unwrap_or_default()
    }

    pub(crate) fn location_code(&self, id: Option<i32>) -> Option<String> {
        id.and_then(|id| self.locations.get(&id))
            .map(|l| l.code.clone())
    }
}

fn balance_order(query: Select<stock_balance::Entity>) -> Select<stock_balance::Entity> {
    query
        .order_by_asc(stock_balance::Column::ProductId)
        .order_by_asc(stock_balance::Column::WarehouseId)
        .order_by_asc(stock_balance::Column::LocationId)
}

fn at_or_below_min_level(query: Select<stock_balance::Entity>) -> Select<stock_balance::Entity> {
    query.inner_join(product::Entity).filter(
        Expr::col((stock_balance::Entity, stock_balance::Column::QuantityOnHand))
            .lte(Expr::col((product::Entity, product::Column::MinStockLevel))),
    )
}

fn overview_cache_key(query: &StockOverviewQuery) -> String {
    fn part(value: Option<i32>) -> String {
        value.map_or_else(|| "-".to_string(), |v| v.to_string())
    }
    format!(
        "{}:{}:{}:{}",
        STOCK_OVERVIEW_CACHE_PREFIX,
        part(query.warehouse_id),
        part(query.product_id),
        query.low_stock_only
    )
}

fn movement_row(tx: stock_transaction::Model, lookup: &CatalogLookup) -> StockMovementRow {
    StockMovementRow {
        transaction_id: tx.id,
        product_id: tx.product_id,
        product_name: lookup.product_name(tx.product_id),
        sku: lookup.sku(tx.product_id),
        warehouse_id: tx.warehouse_id,
        warehouse_code: lookup.warehouse_code(tx.warehouse_id),
        location_id: tx.location_id,
        location_code: lookup.location_code(tx.location_id),
        transaction_type: tx.transaction_type,
        quantity_delta: tx.quantity_delta,
        unit_cost: tx.unit_cost,
        created_at: tx.created_at,
        reference_type: tx.reference_type,
        reference_id: tx.reference_id,
    }
}

/// Serves StockOverview, StockMovements, ProductTimeline, LowStock and DeadStock
#[derive(Clone)]
pub struct StockReadService {
    db: Arc<DatabaseConnection>,
    clock: Arc<dyn Clock>,
    limits: LedgerConfig,
    cache: Option<Arc<dyn CacheBackend>>,
    cache_generation: CacheGeneration,
    cache_ttl: StdDuration,
}

impl StockReadService {
    pub fn new(db: Arc<DatabaseConnection>, clock: Arc<dyn Clock>, limits: LedgerConfig) -> Self {
        Self {
            db,
            clock,
            limits,
            cache: None,
            cache_generation: CacheGeneration::new(),
            cache_ttl: StdDuration::from_secs(30),
        }
    }

    /// Cache overviews; results read while `generation` moved are not stored
    pub fn with_cache(
        mut self,
        cache: Arc<dyn CacheBackend>,
        ttl: StdDuration,
        generation: CacheGeneration,
    ) -> Self {
        self.cache = Some(cache);
        self.cache_ttl = ttl;
        self.cache_generation = generation;
        self
    }

    #[instrument(skip(self))]
    pub async fn stock_overview(
        &self,
        query: StockOverviewQuery,
    ) -> Result<Vec<StockOverviewRow>, ServiceError> {
        let key = overview_cache_key(&query);
        let observed_generation = self.cache_generation.current();
        if let Some(cache) = &self.cache {
            match get_json::<Vec<StockOverviewRow>>(cache.as_ref(), &key).await {
                Ok(Some(rows)) => {
                    debug!(cache_key = %key, "Stock overview served from cache");
                    return Ok(rows);
                }
                Ok(None) => {}
                Err(e) => warn!(cache_key = %key, "Ignoring unreadable cache entry: {}", e),
            }
        }

        let mut select =
            stock_balance::Entity::find().filter(stock_balance::Column::QuantityOnHand.ne(0));
        if let Some(warehouse_id) = query.warehouse_id {
            select = select.filter(stock_balance::Column::WarehouseId.eq(warehouse_id));
        }
        if let Some(product_id) = query.product_id {
            select = select.filter(stock_balance::Column::ProductId.eq(product_id));
        }
        if query.low_stock_only {
            select = at_or_below_min_level(select);
        }
        let balances = balance_order(select).all(&*self.db).await?;
        let lookup = CatalogLookup::for_balances(&*self.db, &balances).await?;

        let rows: Vec<StockOverviewRow> = balances
            .into_iter()
            .map(|b| StockOverviewRow {
                product_id: b.product_id,
                product_name: lookup.product_name(b.product_id),
                sku: lookup.sku(b.product_id),
                warehouse_id: b.warehouse_id,
                warehouse_code: lookup.warehouse_code(b.warehouse_id),
                location_id: b.location_id,
                location_code: lookup.location_code(b.location_id),
                quantity_on_hand: b.quantity_on_hand,
            })
            .collect();

        if let Some(cache) = &self.cache {
            if !self.cache_generation.is_current(observed_generation) {
                debug!(cache_key = %key, "Stock moved during read; overview not cached");
            } else if let Err(e) =
                set_json(cache.as_ref(), &key, &rows, Some(self.cache_ttl)).await
            {
                warn!(cache_key = %key, "Failed to cache stock overview: {}", e);
            }
        }
        Ok(rows)
    }

    /// Movements in `[from_utc, to_utc]`, newest first
    #[instrument(skip(self))]
    pub async fn stock_movements(
        &self,
        query: StockMovementsQuery,
    ) -> Result<Page<StockMovementRow>, ServiceError> {
        if query.to_utc <= query.from_utc {
            return Err(ServiceError::ValidationError(
                "Invalid date range.".to_string(),
            ));
        }
        if query.to_utc - query.from_utc > Duration::days(self.limits.max_movement_window_days) {
            return Err(ServiceError::ValidationError(format!(
                "Date range cannot exceed {} days.",
                self.limits.max_movement_window_days
            )));
        }
        let (page, page_size) = resolve_paging(
            query.page,
            query.page_size,
            self.limits.movements_default_page_size,
            self.limits.max_page_size,
        );

        let mut select = stock_transaction::Entity::find()
            .filter(stock_transaction::Column::CreatedAt.gte(query.from_utc))
            .filter(stock_transaction::Column::CreatedAt.lte(query.to_utc));
        if let Some(warehouse_id) = query.warehouse_id {
            select = select.filter(stock_transaction::Column::WarehouseId.eq(warehouse_id));
        }
        if let Some(product_id) = query.product_id {
            select = select.filter(stock_transaction::Column::ProductId.eq(product_id));
        }

        self.movement_page(select, page, page_size).await
    }

    /// One product's movements, newest first; defaults to the last 30 days
    #[instrument(skip(self))]
    pub async fn product_timeline(
        &self,
        product_id: i32,
        query: ProductTimelineQuery,
    ) -> Result<Page<StockMovementRow>, ServiceError> {
        if product_id <= 0 {
            return Err(ServiceError::ValidationError(
                "Invalid product ID.".to_string(),
            ));
        }
        let to_utc = query.to_utc.unwrap_or_else(|| self.clock.now());
        let from_utc = query
            .from_utc
            .unwrap_or_else(|| to_utc - Duration::days(TIMELINE_DEFAULT_WINDOW_DAYS));
        if to_utc <= from_utc {
            return Err(ServiceError::ValidationError(
                "Invalid date range.".to_string(),
            ));
        }
        let (page, page_size) = resolve_paging(
            query.page,
            query.page_size,
            self.limits.timeline_default_page_size,
            self.limits.max_page_size,
        );

        let mut select = stock_transaction::Entity::find()
            .filter(stock_transaction::Column::ProductId.eq(product_id))
            .filter(stock_transaction::Column::CreatedAt.gte(from_utc))
            .filter(stock_transaction::Column::CreatedAt.lte(to_utc));
        if let Some(warehouse_id) = query.warehouse_id {
            select = select.filter(stock_transaction::Column::WarehouseId.eq(warehouse_id));
        }

        self.movement_page(select, page, page_size).await
    }

    async fn movement_page(
        &self,
        select: Select<stock_transaction::Entity>,
        page: u64,
        page_size: u64,
    ) -> Result<Page<StockMovementRow>, ServiceError> {
        let paginator = select
            .order_by_desc(stock_transaction::Column::CreatedAt)
            .order_by_desc(stock_transaction::Column::Id)
            .paginate(&*self.db, page_size);
        let total = paginator.num_items().await?;
        let transactions = paginator.fetch_page(page - 1).await?;

        let lookup = CatalogLookup::load(
            &*self.db,
            transactions.iter().map(|t| t.product_id),
            transactions.iter().map(|t| t.warehouse_id),
            transactions.iter().filter_map(|t| t.location_id),
        )
        .await?;

        let items = transactions
            .into_iter()
            .map(|tx| movement_row(tx, &lookup))
            .collect();
        Ok(Page::new(items, page, page_size, total))
    }

    #[instrument(skip(self))]
    pub async fn low_stock(&self, query: LowStockQuery) -> Result<Vec<LowStockRow>, ServiceError> {
        let mut select = at_or_below_min_level(stock_balance::Entity::find());
        if let Some(warehouse_id) = query.warehouse_id {
            select = select.filter(stock_balance::Column::WarehouseId.eq(warehouse_id));
        }
        if let Some(product_id) = query.product_id {
            select = select.filter(stock_balance::Column::ProductId.eq(product_id));
        }
        let balances = balance_order(select).all(&*self.db).await?;
        let lookup = CatalogLookup::for_balances(&*self.db, &balances).await?;

        Ok(balances
            .into_iter()
            .map(|b| {
                let min_stock_level = lookup.min_stock_level(b.product_id);
                LowStockRow {
                    product_id: b.product_id,
                    product_name: lookup.product_name(b.product_id),
                    sku: lookup.sku(b.product_id),
                    warehouse_id: b.warehouse_id,
                    warehouse_code: lookup.warehouse_code(b.warehouse_id),
                    location_id: b.location_id,
                    location_code: lookup.location_code(b.location_id),
                    quantity_on_hand: b.quantity_on_hand,
                    min_stock_level,
                    shortage: min_stock_level - b.quantity_on_hand,
                }
            })
            .collect())
    }

    /// Positive balances whose product has not moved in the warehouse for `days`
    #[instrument(skip(self))]
    pub async fn dead_stock(&self, query: DeadStockQuery) -> Result<Vec<DeadStockRow>, ServiceError> {
        let days = query.days.unwrap_or(self.limits.dead_stock_default_days);
        if !(1..=MAX_DEAD_STOCK_DAYS).contains(&days) {
            return Err(ServiceError::ValidationError(format!(
                "Days must be between 1 and {}.",
                MAX_DEAD_STOCK_DAYS
            )));
        }
        let now = self.clock.now();
        let cutoff = now - Duration::days(days);

        let mut select =
            stock_balance::Entity::find().filter(stock_balance::Column::QuantityOnHand.gt(0));
        if let Some(warehouse_id) = query.warehouse_id {
            select = select.filter(stock_balance::Column::WarehouseId.eq(warehouse_id));
        }
        let balances = balance_order(select).all(&*self.db).await?;

        let mut last_movements: HashMap<(i32, i32), Option<DateTime<Utc>>> = HashMap::new();
        for balance in &balances {
            let pair = (balance.product_id, balance.warehouse_id);
            if last_movements.contains_key(&pair) {
                continue;
            }
            let latest = stock_transaction::Entity::find()
                .filter(stock_transaction::Column::ProductId.eq(pair.0))
                .filter(stock_transaction::Column::WarehouseId.eq(pair.1))
                .order_by_desc(stock_transaction::Column::CreatedAt)
                .limit(1)
                .one(&*self.db)
                .await?
                .map(|tx| tx.created_at);
            last_movements.insert(pair, latest);
        }

        let dead: Vec<(stock_balance::Model, Option<DateTime<Utc>>)> = balances
            .into_iter()
            .filter_map(|b| {
                let last = last_movements
                    .get(&(b.product_id, b.warehouse_id))
                    .copied()
                    .flatten();
                match last {
                    Some(at) if at >= cutoff => None,
                    _ => Some((b, last)),
                }
            })
            .collect();

        let lookup = CatalogLookup::load(
            &*self.db,
            dead.iter().map(|(b, _)| b.product_id),
            dead.iter().map(|(b, _)| b.warehouse_id),
            dead.iter().filter_map(|(b, _)| b.location_id),
        )
        .await?;

        let mut rows: Vec<DeadStockRow> = dead
            .into_iter()
            .map(|(b, last)| DeadStockRow {
                product_id: b.product_id,
                product_name: lookup.product_name(b.product_id),
                sku: lookup.sku(b.product_id),
                warehouse_id: b.warehouse_id,
                warehouse_code: lookup.warehouse_code(b.warehouse_id),
                location_id: b.location_id,
                location_code: lookup.location_code(b.location_id),
                quantity_on_hand: b.quantity_on_hand,
                last_movement_at: last,
                days_since_last_movement: last.map_or(days, |at| (now - at).num_days()),
            })
            .collect();

        // Never-moved stock first, then oldest movement first
        rows.sort_by(|a, b| {
            a.last_movement_at
                .cmp(&b.last_movement_at)
                .then(a.product_id.cmp(&b.product_id))
                .then(a.warehouse_id.cmp(&b.warehouse_id))
                .then(a.location_id.cmp(&b.location_id))
        });
        Ok(rows)
    }
}
