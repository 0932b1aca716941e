use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};

use crate::{
    errors::ServiceError,
    handlers::common::success_response,
    services::{
        dashboard::DashboardService,
        stock_read::{
            DeadStockQuery, LowStockQuery, ProductTimelineQuery, StockMovementsQuery,
            StockReadService,
        },
        valuation::{ValuationQuery, ValuationService},
    },
};

pub trait ReportsHandlerState: Clone + Send + Sync + 'static {
    fn stock_read_service(&self) -> &StockReadService;
    fn valuation_service(&self) -> &ValuationService;
    fn dashboard_service(&self) -> &DashboardService;
}

/// Reports mounted under `/reports`
pub fn reports_router<S>() -> Router<S>
where
    S: ReportsHandlerState,
{
    Router::new()
        .route("/stock-movements", get(stock_movements::<S>))
        .route("/low-stock", get(low_stock::<S>))
        .route("/dead-stock", get(dead_stock::<S>))
        .route("/stock-valuation", get(stock_valuation::<S>))
        .route("/dashboard", get(dashboard_summary::<S>))
}

/// Timeline route mounted next to the catalog's `/products`
pub fn product_timeline_router<S>() -> Router<S>
where
    S: ReportsHandlerState,
{
    Router::new().route("/products/:id/timeline", get(product_timeline::<S>))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/stock-movements",
    params(StockMovementsQuery),
    responses(
        (status = 200, description = "Movements in the window, newest first"),
        (status = 400, description = "Invalid date range", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "reports"
)]
pub async fn stock_movements<S>(
    State(state): State<S>,
    Query(query): Query<StockMovementsQuery>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: ReportsHandlerState,
{
    let page = state.stock_read_service().stock_movements(query).await?;
    Ok(success_response(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/products/{id}/timeline",
    params(
        ("id" = i32, Path, description = "Product id"),
        ProductTimelineQuery
    ),
    responses(
        (status = 200, description = "Product movements, newest first"),
        (status = 400, description = "Invalid product id or date range", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "reports"
)]
pub async fn product_timeline<S>(
    State(state): State<S>,
    Path(product_id): Path<i32>,
    Query(query): Query<ProductTimelineQuery>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: ReportsHandlerState,
{
    let page = state
        .stock_read_service()
        .product_timeline(product_id, query)
        .await?;
    Ok(success_response(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/low-stock",
    params(LowStockQuery),
    responses(
        (status = 200, description = "Balances at or below minimum stock level", body = [crate::services::stock_read::LowStockRow]),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "reports"
)]
pub async fn low_stock<S>(
    State(state): State<S>,
    Query(query): Query<LowStockQuery>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: ReportsHandlerState,
{
    let rows = state.stock_read_service().low_stock(query).await?;
    Ok(success_response(rows))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/dead-stock",
    params(DeadStockQuery),
    responses(
        (status = 200, description = "Stock without recent movement", body = [crate::services::stock_read::DeadStockRow]),
        (status = 400, description = "Days out of range", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "reports"
)]
pub async fn dead_stock<S>(
    State(state): State<S>,
    Query(query): Query<DeadStockQuery>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: ReportsHandlerState,
{
    let rows = state.stock_read_service().dead_stock(query).await?;
    Ok(success_response(rows))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/stock-valuation",
    params(ValuationQuery),
    responses(
        (status = 200, description = "Valued balances, highest value first", body = [crate::services::valuation::ValuationRow]),
        (status = 400, description = "Unknown valuation mode", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "reports"
)]
pub async fn stock_valuation<S>(
    State(state): State<S>,
    Query(query): Query<ValuationQuery>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: ReportsHandlerState,
{
    let rows = state.valuation_service().stock_valuation(query).await?;
    Ok(success_response(rows))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/dashboard",
    responses(
        (status = 200, description = "Catalog counts and stock health", body = crate::services::dashboard::DashboardSummary),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "reports"
)]
pub async fn dashboard_summary<S>(State(state): State<S>) -> Result<impl IntoResponse, ServiceError>
where
    S: ReportsHandlerState,
{
    let summary = state.dashboard_service().summary().await?;
    Ok(success_response(summary))
}
