use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    cache::{CacheBackend, CacheGeneration},
    clock::Clock,
    db::is_unique_violation,
    entities::stock_balance,
    errors::ServiceError,
    middleware_helpers::retry::{with_retry, ConflictRetryPolicy, RetryConfig},
    models::{
        apply_delta, Actor, DeltaError, MovementContext, NewStockTransaction, Reference, Triple,
    },
    services::{
        catalog::{ensure_triple_exists, EntityCatalog},
        stock_read::STOCK_OVERVIEW_CACHE_PREFIX,
    },
};

const INSUFFICIENT_STOCK: &str = "Insufficient stock.";
const INSUFFICIENT_SOURCE_STOCK: &str = "Insufficient stock in the source location.";
const SAME_SOURCE_AND_DESTINATION: &str = "Source and destination cannot be the same.";
const NO_BALANCE_TO_ADJUST: &str = "Cannot adjust negative stock when no balance exists.";
const ADJUSTMENT_WOULD_GO_NEGATIVE: &str =
    "Stock adjustment would result in negative stock balance.";
const DEFAULT_ADJUSTMENT_REFERENCE: &str = "adjustment";

/// Receive goods into a triple
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ReceiveStock {
    pub product_id: i32,
    pub warehouse_id: i32,
    pub location_id: Option<i32>,
    #[validate(range(min = 1, message = "Quantity must be greater than zero."))]
    pub quantity: i32,
    #[schema(value_type = Option<String>, example = "5.00")]
    pub unit_cost: Option<Decimal>,
    #[validate(length(max = 50))]
    pub reference_type: Option<String>,
    #[validate(length(max = 100))]
    pub reference_id: Option<String>,
}

/// Issue goods out of a triple
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct IssueStock {
    pub product_id: i32,
    pub warehouse_id: i32,
    pub location_id: Option<i32>,
    #[validate(range(min = 1, message = "Quantity must be greater than zero."))]
    pub quantity: i32,
    #[validate(length(max = 50))]
    pub reference_type: Option<String>,
    #[validate(length(max = 100))]
    pub reference_id: Option<String>,
}

/// Move goods between two triples of the same product
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct TransferStock {
    pub product_id: i32,
    pub from_warehouse_id: i32,
    pub from_location_id: Option<i32>,
    pub to_warehouse_id: i32,
    pub to_location_id: Option<i32>,
    #[validate(range(min = 1, message = "Quantity must be greater than zero."))]
    pub quantity: i32,
    #[validate(length(max = 50))]
    pub reference_type: Option<String>,
    #[validate(length(max = 100))]
    pub reference_id: Option<String>,
}

/// Correct a triple's on-hand quantity by a signed delta
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct AdjustStock {
    pub product_id: i32,
    pub warehouse_id: i32,
    pub location_id: Option<i32>,
    pub quantity_delta: i32,
    #[validate(length(min = 1, max = 200, message = "Reason is required (max 200 characters)."))]
    pub reason: String,
    #[validate(length(max = 50))]
    pub reference_type: Option<String>,
    #[validate(length(max = 100))]
    pub reference_id: Option<String>,
}

impl ReceiveStock {
    fn triple(&self) -> Triple {
        Triple::new(self.product_id, self.warehouse_id, self.location_id)
    }
}

impl IssueStock {
    fn triple(&self) -> Triple {
        Triple::new(self.product_id, self.warehouse_id, self.location_id)
    }
}

impl TransferStock {
    fn source(&self) -> Triple {
        Triple::new(self.product_id, self.from_warehouse_id, self.from_location_id)
    }

    fn destination(&self) -> Triple {
        Triple::new(self.product_id, self.to_warehouse_id, self.to_location_id)
    }
}

impl AdjustStock {
    fn triple(&self) -> Triple {
        Triple::new(self.product_id, self.warehouse_id, self.location_id)
    }

    /// Adjustments always carry a reference: the reason stands in for a missing id,
    /// cut to the reference id length
    fn reference(&self) -> Reference {
        let reference = Reference::new(self.reference_type.clone(), self.reference_id.clone());
        Reference {
            reference_type: reference
                .reference_type
                .or_else(|| Some(DEFAULT_ADJUSTMENT_REFERENCE.to_string())),
            reference_id: reference.reference_id.or_else(|| {
                Some(
                    self.reason
                        .trim()
                        .chars()
                        .take(Reference::MAX_ID_LEN)
                        .collect::<String>()
                        .trim_end()
                        .to_string(),
                )
            }),
        }
    }
}

/// Loads the balance snapshot for a triple, if one was ever created
pub async fn load_balance<C: ConnectionTrait>(
    conn: &C,
    triple: Triple,
) -> Result<Option<stock_balance::Model>, ServiceError> {
    stock_balance::Entity::find()
        .filter(stock_balance::Column::TripleKey.eq(triple.key()))
        .one(conn)
        .await
        .map_err(|e| {
            error!(triple = %triple, "Failed to fetch stock balance: {}", e);
            ServiceError::db_error(e)
        })
}

/// Writes `quantity_on_hand` only if the row still carries the version that was read.
///
/// Zero affected rows means another writer got there first.
pub async fn compare_and_swap_balance<C: ConnectionTrait>(
    conn: &C,
    current: &stock_balance::Model,
    quantity_on_hand: i32,
    now: DateTime<Utc>,
    actor: &Actor,
) -> Result<(), ServiceError> {
    let result = stock_balance::Entity::update_many()
        .col_expr(
            stock_balance::Column::QuantityOnHand,
            Expr::value(quantity_on_hand),
        )
        .col_expr(
            stock_balance::Column::Version,
            Expr::value(current.version + 1),
        )
        .col_expr(stock_balance::Column::UpdatedAt, Expr::value(now))
        .col_expr(
            stock_balance::Column::UpdatedByUserId,
            Expr::value(actor.user_id),
        )
        .col_expr(
            stock_balance::Column::UpdatedByName,
            Expr::value(actor.name.clone()),
        )
        .filter(stock_balance::Column::Id.eq(current.id))
        .filter(stock_balance::Column::Version.eq(current.version))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        counter!("stock_ledger.balance.version_conflicts", 1);
        return Err(ServiceError::ConcurrentModification(current.triple_key.clone()));
    }
    Ok(())
}

/// Creates the first balance snapshot of a triple.
///
/// Losing a race on the unique triple key is reported as a concurrency conflict.
pub async fn create_balance<C: ConnectionTrait>(
    conn: &C,
    triple: Triple,
    quantity_on_hand: i32,
    now: DateTime<Utc>,
    actor: &Actor,
) -> Result<(), ServiceError> {
    stock_balance::ActiveModel {
        product_id: Set(triple.product_id),
        warehouse_id: Set(triple.warehouse_id),
        location_id: Set(triple.location_id),
        triple_key: Set(triple.key()),
        quantity_on_hand: Set(quantity_on_hand),
        version: Set(1),
        created_at: Set(now),
        updated_at: Set(now),
        updated_by_user_id: Set(actor.user_id),
        updated_by_name: Set(actor.name.clone()),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            counter!("stock_ledger.balance.version_conflicts", 1);
            ServiceError::ConcurrentModification(triple.key())
        } else {
            ServiceError::db_error(e)
        }
    })?;
    Ok(())
}

async fn store_balance(
    txn: &DatabaseTransaction,
    triple: Triple,
    existing: Option<&stock_balance::Model>,
    quantity_on_hand: i32,
    now: DateTime<Utc>,
    actor: &Actor,
) -> Result<(), ServiceError> {
    match existing {
        Some(balance) => compare_and_swap_balance(txn, balance, quantity_on_hand, now, actor).await,
        None => create_balance(txn, triple, quantity_on_hand, now, actor).await,
    }
}

async fn insert_record(
    txn: &DatabaseTransaction,
    record: &NewStockTransaction,
    now: DateTime<Utc>,
    actor: &Actor,
) -> Result<i32, ServiceError> {
    let model = record
        .clone()
        .into_active_model(now, actor)
        .insert(txn)
        .await
        .map_err(|e| {
            error!("Failed to insert stock transaction: {}", e);
            ServiceError::db_error(e)
        })?;
    Ok(model.id)
}

fn overflow() -> ServiceError {
    ServiceError::ValidationError("Quantity would overflow the stock balance.".to_string())
}

fn insufficient(err: DeltaError, message: &str) -> ServiceError {
    match err {
        DeltaError::Negative => ServiceError::InsufficientStock(message.to_string()),
        DeltaError::Overflow => overflow(),
    }
}

/// Receive, Issue, Transfer and Adjust over the ledger and balance snapshots.
///
/// Every operation validates, checks the catalog, then writes ledger row(s) and
/// balance snapshot(s) in one database transaction. Lost version races are
/// retried; every other failure is returned as is.
#[derive(Clone)]
pub struct StockMovementService {
    db: Arc<DatabaseConnection>,
    catalog: Arc<dyn EntityCatalog>,
    clock: Arc<dyn Clock>,
    cache: Option<Arc<dyn CacheBackend>>,
    cache_generation: CacheGeneration,
    retry: RetryConfig,
}

impl StockMovementService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        catalog: Arc<dyn EntityCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            catalog,
            clock,
            cache: None,
            cache_generation: CacheGeneration::new(),
            retry: RetryConfig::with_retries(3),
        }
    }

    /// Invalidate cached stock overviews after each commit and bump `generation`
    pub fn with_cache(
        mut self,
        cache: Arc<dyn CacheBackend>,
        generation: CacheGeneration,
    ) -> Self {
        self.cache = Some(cache);
        self.cache_generation = generation;
        self
    }

    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.retry = RetryConfig::with_retries(retries);
        self
    }

    #[instrument(skip(self, ctx, cmd), fields(product_id = cmd.product_id, warehouse_id = cmd.warehouse_id, quantity = cmd.quantity))]
    pub async fn receive(
        &self,
        ctx: &MovementContext,
        cmd: ReceiveStock,
    ) -> Result<i32, ServiceError> {
        cmd.validate()?;
        let triple = cmd.triple();
        let record = NewStockTransaction::inbound(
            triple,
            cmd.quantity,
            cmd.unit_cost,
            Reference::new(cmd.reference_type, cmd.reference_id),
        )?;
        ensure_triple_exists(self.catalog.as_ref(), triple).await?;

        let id = self
            .run("receive", || self.receive_once(ctx, &record))
            .await?;
        info!(transaction_id = id, triple = %triple, "Stock received");
        Ok(id)
    }

    async fn receive_once(
        &self,
        ctx: &MovementContext,
        record: &NewStockTransaction,
    ) -> Result<i32, ServiceError> {
        ctx.cancel.check()?;
        let txn = self.begin().await?;
        let now = self.clock.now();
        let triple = record.triple();

        let balance = load_balance(&txn, triple).await?;
        let current = balance.as_ref().map_or(0, |b| b.quantity_on_hand);
        let next = apply_delta(current, record.quantity_delta()).map_err(|_| overflow())?;

        let id = insert_record(&txn, record, now, &ctx.actor).await?;
        store_balance(&txn, triple, balance.as_ref(), next, now, &ctx.actor).await?;

        self.commit(ctx, txn).await?;
        Ok(id)
    }

    #[instrument(skip(self, ctx, cmd), fields(product_id = cmd.product_id, warehouse_id = cmd.warehouse_id, quantity = cmd.quantity))]
    pub async fn issue(&self, ctx: &MovementContext, cmd: IssueStock) -> Result<i32, ServiceError> {
        cmd.validate()?;
        let triple = cmd.triple();
        let record = NewStockTransaction::outbound(
            triple,
            cmd.quantity,
            Reference::new(cmd.reference_type, cmd.reference_id),
        )?;
        ensure_triple_exists(self.catalog.as_ref(), triple).await?;

        let id = self.run("issue", || self.issue_once(ctx, &record)).await?;
        info!(transaction_id = id, triple = %triple, "Stock issued");
        Ok(id)
    }

    async fn issue_once(
        &self,
        ctx: &MovementContext,
        record: &NewStockTransaction,
    ) -> Result<i32, ServiceError> {
        ctx.cancel.check()?;
        let txn = self.begin().await?;
        let now = self.clock.now();
        let triple = record.triple();

        let balance = load_balance(&txn, triple)
            .await?
            .ok_or_else(|| ServiceError::InsufficientStock(INSUFFICIENT_STOCK.to_string()))?;
        let next = apply_delta(balance.quantity_on_hand, record.quantity_delta())
            .map_err(|e| insufficient(e, INSUFFICIENT_STOCK))?;

        let id = insert_record(&txn, record, now, &ctx.actor).await?;
        compare_and_swap_balance(&txn, &balance, next, now, &ctx.actor).await?;

        self.commit(ctx, txn).await?;
        Ok(id)
    }

    /// Returns the id of the `OUT` record written at the source.
    #[instrument(skip(self, ctx, cmd), fields(product_id = cmd.product_id, quantity = cmd.quantity))]
    pub async fn transfer(
        &self,
        ctx: &MovementContext,
        cmd: TransferStock,
    ) -> Result<i32, ServiceError> {
        cmd.validate()?;
        let source = cmd.source();
        let destination = cmd.destination();
        if source == destination {
            return Err(ServiceError::ValidationError(
                SAME_SOURCE_AND_DESTINATION.to_string(),
            ));
        }

        let reference = Reference::new(cmd.reference_type, cmd.reference_id);
        let outbound = NewStockTransaction::outbound(source, cmd.quantity, reference.clone())?;
        let inbound = NewStockTransaction::inbound(destination, cmd.quantity, None, reference)?;
        ensure_triple_exists(self.catalog.as_ref(), source).await?;
        ensure_triple_exists(self.catalog.as_ref(), destination).await?;

        let id = self
            .run("transfer", || self.transfer_once(ctx, &outbound, &inbound))
            .await?;
        info!(
            transaction_id = id,
            source = %source,
            destination = %destination,
            "Stock transferred"
        );
        Ok(id)
    }

    async fn transfer_once(
        &self,
        ctx: &MovementContext,
        outbound: &NewStockTransaction,
        inbound: &NewStockTransaction,
    ) -> Result<i32, ServiceError> {
        ctx.cancel.check()?;
        let txn = self.begin().await?;
        let now = self.clock.now();

        let source = load_balance(&txn, outbound.triple())
            .await?
            .ok_or_else(|| {
                ServiceError::InsufficientStock(INSUFFICIENT_SOURCE_STOCK.to_string())
            })?;
        let next_source = apply_delta(source.quantity_on_hand, outbound.quantity_delta())
            .map_err(|e| insufficient(e, INSUFFICIENT_SOURCE_STOCK))?;

        let destination = load_balance(&txn, inbound.triple()).await?;
        let next_destination = apply_delta(
            destination.as_ref().map_or(0, |b| b.quantity_on_hand),
            inbound.quantity_delta(),
        )
        .map_err(|_| overflow())?;

        let out_id = insert_record(&txn, outbound, now, &ctx.actor).await?;
        insert_record(&txn, inbound, now, &ctx.actor).await?;
        compare_and_swap_balance(&txn, &source, next_source, now, &ctx.actor).await?;
        store_balance(
            &txn,
            inbound.triple(),
            destination.as_ref(),
            next_destination,
            now,
            &ctx.actor,
        )
        .await?;

        self.commit(ctx, txn).await?;
        Ok(out_id)
    }

    #[instrument(skip(self, ctx, cmd), fields(product_id = cmd.product_id, warehouse_id = cmd.warehouse_id, delta = cmd.quantity_delta))]
    pub async fn adjust(
        &self,
        ctx: &MovementContext,
        cmd: AdjustStock,
    ) -> Result<i32, ServiceError> {
        cmd.validate()?;
        if cmd.reason.trim().is_empty() {
            return Err(ServiceError::ValidationError("Reason is required.".to_string()));
        }
        let triple = cmd.triple();
        let record = NewStockTransaction::adjustment(triple, cmd.quantity_delta, cmd.reference())?;
        ensure_triple_exists(self.catalog.as_ref(), triple).await?;

        let id = self.run("adjust", || self.adjust_once(ctx, &record)).await?;
        info!(transaction_id = id, triple = %triple, reason = %cmd.reason, "Stock adjusted");
        Ok(id)
    }

    async fn adjust_once(
        &self,
        ctx: &MovementContext,
        record: &NewStockTransaction,
    ) -> Result<i32, ServiceError> {
        ctx.cancel.check()?;
        let txn = self.begin().await?;
        let now = self.clock.now();
        let triple = record.triple();
        let delta = record.quantity_delta();

        let balance = load_balance(&txn, triple).await?;
        if balance.is_none() && delta < 0 {
            return Err(ServiceError::InsufficientStock(
                NO_BALANCE_TO_ADJUST.to_string(),
            ));
        }
        let current = balance.as_ref().map_or(0, |b| b.quantity_on_hand);
        let next =
            apply_delta(current, delta).map_err(|e| insufficient(e, ADJUSTMENT_WOULD_GO_NEGATIVE))?;

        let id = insert_record(&txn, record, now, &ctx.actor).await?;
        store_balance(&txn, triple, balance.as_ref(), next, now, &ctx.actor).await?;

        self.commit(ctx, txn).await?;
        Ok(id)
    }

    async fn run<F, Fut>(&self, operation: &'static str, attempt: F) -> Result<i32, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<i32, ServiceError>>,
    {
        let result = with_retry(&self.retry, ConflictRetryPolicy, attempt).await;
        match &result {
            Ok(_) => {
                counter!("stock_ledger.movements.committed", 1, "operation" => operation);
                self.invalidate_read_cache().await;
            }
            Err(err) => {
                counter!("stock_ledger.movements.rejected", 1, "operation" => operation);
                debug!(operation, error = %err, "Stock movement rejected");
            }
        }
        result
    }

    async fn begin(&self) -> Result<DatabaseTransaction, ServiceError> {
        self.db.begin().await.map_err(|e| {
            error!("Failed to begin transaction: {}", e);
            ServiceError::db_error(e)
        })
    }

    /// Last cancellation point; dropping `txn` uncommitted rolls everything back
    async fn commit(
        &self,
        ctx: &MovementContext,
        txn: DatabaseTransaction,
    ) -> Result<(), ServiceError> {
        ctx.cancel.check()?;
        txn.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            ServiceError::db_error(e)
        })
    }

    async fn invalidate_read_cache(&self) {
        if let Some(cache) = &self.cache {
            self.cache_generation.bump();
            if let Err(e) = cache.delete_prefix(STOCK_OVERVIEW_CACHE_PREFIX).await {
                warn!("Failed to invalidate stock overview cache: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adjust(reason: &str, reference_type: Option<&str>, reference_id: Option<&str>) -> AdjustStock {
        AdjustStock {
            product_id: 1,
            warehouse_id: 1,
            location_id: None,
            quantity_delta: 2,
            reason: reason.to_string(),
            reference_type: reference_type.map(str::to_string),
            reference_id: reference_id.map(str::to_string),
        }
    }

    #[test]
    fn adjustment_reference_defaults_to_reason() {
        let reference = adjust("cycle count", None, None).reference();
        assert_eq!(reference.reference_type.as_deref(), Some("adjustment"));
        assert_eq!(reference.reference_id.as_deref(), Some("cycle count"));
    }

    #[test]
    fn explicit_adjustment_reference_is_kept() {
        let reference = adjust("damaged", Some("rma"), Some("RMA-12")).reference();
        assert_eq!(reference.reference_type.as_deref(), Some("rma"));
        assert_eq!(reference.reference_id.as_deref(), Some("RMA-12"));
    }

    #[test]
    fn long_reason_is_cut_to_reference_id_length() {
        let cmd = adjust(&"r".repeat(150), None, None);
        assert!(cmd.validate().is_ok());
        let reference = cmd.reference();
        assert_eq!(
            reference.reference_id.as_deref().map(|id| id.chars().count()),
            Some(Reference::MAX_ID_LEN)
        );
        assert!(reference.validate().is_ok());
    }

    #[test]
    fn command_validation_rejects_long_references_and_reasons() {
        let mut cmd = adjust(&"r".repeat(201), None, None);
        assert!(cmd.validate().is_err());
        cmd.reason = "ok".into();
        cmd.reference_id = Some("i".repeat(101));
        assert!(cmd.validate().is_err());
    }

    #[test]
    fn negative_delta_maps_to_operation_message() {
        match insufficient(DeltaError::Negative, INSUFFICIENT_SOURCE_STOCK) {
            ServiceError::InsufficientStock(msg) => assert_eq!(msg, INSUFFICIENT_SOURCE_STOCK),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(
            insufficient(DeltaError::Overflow, INSUFFICIENT_STOCK),
            ServiceError::ValidationError(_)
        ));
    }
}
