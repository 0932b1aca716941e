use axum::{
    extract::{Json, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tracing::info;

use crate::{
    errors::ServiceError,
    handlers::common::{created_response, success_response, MovementRecorded, RequestActor},
    models::MovementContext,
    services::{
        movements::{AdjustStock, IssueStock, ReceiveStock, StockMovementService, TransferStock},
        stock_read::{StockOverviewQuery, StockReadService},
    },
};

/// State that exposes the movement and read services to inventory handlers
pub trait InventoryHandlerState: Clone + Send + Sync + 'static {
    fn movement_service(&self) -> &StockMovementService;
    fn stock_read_service(&self) -> &StockReadService;
}

/// Create the inventory router
pub fn inventory_router<S>() -> Router<S>
where
    S: InventoryHandlerState,
{
    Router::new()
        .route("/receive", post(receive_stock::<S>))
        .route("/issue", post(issue_stock::<S>))
        .route("/transfer", post(transfer_stock::<S>))
        .route("/adjust", post(adjust_stock::<S>))
        .route("/overview", get(stock_overview::<S>))
}

/// Receive goods into a product, warehouse and location
#[utoipa::path(
    post,
    path = "/api/v1/inventory/receive",
    request_body = ReceiveStock,
    params(
        ("x-actor-id" = Option<i32>, Header, description = "Acting user id"),
        ("x-actor-name" = Option<String>, Header, description = "Acting user name"),
    ),
    responses(
        (status = 201, description = "Receipt recorded", body = MovementRecorded),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product, warehouse or location not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent modification", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn receive_stock<S>(
    State(state): State<S>,
    RequestActor(actor): RequestActor,
    Json(payload): Json<ReceiveStock>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: InventoryHandlerState,
{
    let ctx = MovementContext::new(actor);
    let transaction_id = state.movement_service().receive(&ctx, payload).await?;
    info!(transaction_id, "Stock received");
    Ok(created_response(MovementRecorded { transaction_id }))
}

/// Issue goods out of a product, warehouse and location
#[utoipa::path(
    post,
    path = "/api/v1/inventory/issue",
    request_body = IssueStock,
    params(
        ("x-actor-id" = Option<i32>, Header, description = "Acting user id"),
        ("x-actor-name" = Option<String>, Header, description = "Acting user name"),
    ),
    responses(
        (status = 201, description = "Issue recorded", body = MovementRecorded),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product, warehouse or location not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent modification", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn issue_stock<S>(
    State(state): State<S>,
    RequestActor(actor): RequestActor,
    Json(payload): Json<IssueStock>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: InventoryHandlerState,
{
    let ctx = MovementContext::new(actor);
    let transaction_id = state.movement_service().issue(&ctx, payload).await?;
    info!(transaction_id, "Stock issued");
    Ok(created_response(MovementRecorded { transaction_id }))
}

/// Transfer goods between two locations; returns the outbound ledger row id
#[utoipa::path(
    post,
    path = "/api/v1/inventory/transfer",
    request_body = TransferStock,
    params(
        ("x-actor-id" = Option<i32>, Header, description = "Acting user id"),
        ("x-actor-name" = Option<String>, Header, description = "Acting user name"),
    ),
    responses(
        (status = 201, description = "Transfer recorded", body = MovementRecorded),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product, warehouse or location not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent modification", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock in the source location", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn transfer_stock<S>(
    State(state): State<S>,
    RequestActor(actor): RequestActor,
    Json(payload): Json<TransferStock>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: InventoryHandlerState,
{
    let ctx = MovementContext::new(actor);
    let transaction_id = state.movement_service().transfer(&ctx, payload).await?;
    info!(transaction_id, "Stock transferred");
    Ok(created_response(MovementRecorded { transaction_id }))
}

/// Correct on-hand stock by a signed delta
#[utoipa::path(
    post,
    path = "/api/v1/inventory/adjust",
    request_body = AdjustStock,
    params(
        ("x-actor-id" = Option<i32>, Header, description = "Acting user id"),
        ("x-actor-name" = Option<String>, Header, description = "Acting user name"),
    ),
    responses(
        (status = 201, description = "Adjustment recorded", body = MovementRecorded),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product, warehouse or location not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent modification", body = crate::errors::ErrorResponse),
        (status = 422, description = "Adjustment would make stock negative", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn adjust_stock<S>(
    State(state): State<S>,
    RequestActor(actor): RequestActor,
    Json(payload): Json<AdjustStock>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: InventoryHandlerState,
{
    let ctx = MovementContext::new(actor);
    let transaction_id = state.movement_service().adjust(&ctx, payload).await?;
    info!(transaction_id, "Stock adjusted");
    Ok(created_response(MovementRecorded { transaction_id }))
}

/// Non-zero balances with product, warehouse and location labels
#[utoipa::path(
    get,
    path = "/api/v1/inventory/overview",
    params(StockOverviewQuery),
    responses(
        (status = 200, description = "Stock overview returned", body = [crate::services::stock_read::StockOverviewRow]),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "inventory"
)]
pub async fn stock_overview<S>(
    State(state): State<S>,
    Query(query): Query<StockOverviewQuery>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: InventoryHandlerState,
{
    let rows = state.stock_read_service().stock_overview(query).await?;
    Ok(success_response(rows))
}
