use axum::{
    extract::{Json, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    errors::ServiceError,
    handlers::common::{created_response, success_response, PaginationParams},
    services::catalog::{
        CatalogService, CreateLocationRequest, CreateProductRequest, CreateWarehouseRequest,
    },
};

const MAX_PRODUCTS_PER_PAGE: u64 = 200;

pub trait CatalogHandlerState: Clone + Send + Sync + 'static {
    fn catalog_service(&self) -> &CatalogService;
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LocationFilter {
    pub warehouse_id: Option<i32>,
}

pub fn catalog_router<S>() -> Router<S>
where
    S: CatalogHandlerState,
{
    Router::new()
        .route("/products", get(list_products::<S>).post(create_product::<S>))
        .route(
            "/warehouses",
            get(list_warehouses::<S>).post(create_warehouse::<S>),
        )
        .route("/locations", get(list_locations::<S>).post(create_location::<S>))
}

#[utoipa::path(
    post,
    path = "/api/v1/products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = crate::services::catalog::ProductSummary),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 409, description = "Duplicate SKU or barcode", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn create_product<S>(
    State(state): State<S>,
    Json(payload): Json<CreateProductRequest>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: CatalogHandlerState,
{
    let product = state.catalog_service().create_product(payload).await?;
    Ok(created_response(product))
}

#[utoipa::path(
    get,
    path = "/api/v1/products",
    params(PaginationParams),
    responses(
        (status = 200, description = "Products, by id"),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn list_products<S>(
    State(state): State<S>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: CatalogHandlerState,
{
    let (page, per_page) = params.clamped(MAX_PRODUCTS_PER_PAGE);
    let products = state
        .catalog_service()
        .list_products(page, per_page)
        .await?;
    Ok(success_response(products))
}

#[utoipa::path(
    post,
    path = "/api/v1/warehouses",
    request_body = CreateWarehouseRequest,
    responses(
        (status = 201, description = "Warehouse created", body = crate::services::catalog::WarehouseSummary),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 409, description = "Duplicate code", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn create_warehouse<S>(
    State(state): State<S>,
    Json(payload): Json<CreateWarehouseRequest>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: CatalogHandlerState,
{
    let warehouse = state.catalog_service().create_warehouse(payload).await?;
    Ok(created_response(warehouse))
}

#[utoipa::path(
    get,
    path = "/api/v1/warehouses",
    responses(
        (status = 200, description = "Warehouses, by code", body = [crate::services::catalog::WarehouseSummary])
    ),
    tag = "catalog"
)]
pub async fn list_warehouses<S>(State(state): State<S>) -> Result<impl IntoResponse, ServiceError>
where
    S: CatalogHandlerState,
{
    let warehouses = state.catalog_service().list_warehouses().await?;
    Ok(success_response(warehouses))
}

#[utoipa::path(
    post,
    path = "/api/v1/locations",
    request_body = CreateLocationRequest,
    responses(
        (status = 201, description = "Location created", body = crate::services::catalog::LocationSummary),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 404, description = "Warehouse not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Duplicate code in warehouse", body = crate::errors::ErrorResponse)
    ),
    tag = "catalog"
)]
pub async fn create_location<S>(
    State(state): State<S>,
    Json(payload): Json<CreateLocationRequest>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: CatalogHandlerState,
{
    let location = state.catalog_service().create_location(payload).await?;
    Ok(created_response(location))
}

#[utoipa::path(
    get,
    path = "/api/v1/locations",
    params(LocationFilter),
    responses(
        (status = 200, description = "Locations, by warehouse and code", body = [crate::services::catalog::LocationSummary])
    ),
    tag = "catalog"
)]
pub async fn list_locations<S>(
    State(state): State<S>,
    Query(filter): Query<LocationFilter>,
) -> Result<impl IntoResponse, ServiceError>
where
    S: CatalogHandlerState,
{
    let locations = state
        .catalog_service()
        .list_locations(filter.warehouse_id)
        .await?;
    Ok(success_response(locations))
}
