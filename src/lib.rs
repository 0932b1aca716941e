//! Stock Ledger library
//!
//! Append-only inventory movement ledger with per-location balance snapshots,
//! cost valuation and stock reports, served over an axum HTTP API.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod cache;
pub mod clock;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod middleware_helpers;
pub mod models;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{extract::State, response::Json, routing::get, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::{sync::Arc, time::Instant};
use utoipa::ToSchema;

use crate::{
    cache::{CacheBackend, CacheGeneration, InMemoryCache},
    clock::{Clock, SystemClock},
    handlers::{
        catalog::CatalogHandlerState, inventory::InventoryHandlerState,
        reports::ReportsHandlerState,
    },
    services::{
        catalog::{CatalogService, DbEntityCatalog},
        dashboard::DashboardService,
        movements::StockMovementService,
        stock_read::StockReadService,
        valuation::ValuationService,
    },
};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub cache: Option<Arc<dyn CacheBackend>>,
    pub catalog: CatalogService,
    pub movements: StockMovementService,
    pub stock_read: StockReadService,
    pub valuation: ValuationService,
    pub dashboard: DashboardService,
    started_at: Instant,
}

impl AppState {
    pub fn new(db: Arc<DatabaseConnection>, config: config::AppConfig) -> Self {
        Self::with_clock(db, config, Arc::new(SystemClock))
    }

    /// Wires every service against one connection pool and clock
    pub fn with_clock(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache: Option<Arc<dyn CacheBackend>> = if config.cache.enabled {
            Some(Arc::new(InMemoryCache::new()))
        } else {
            None
        };

        let catalog = CatalogService::new(db.clone(), clock.clone());
        let entity_catalog = Arc::new(DbEntityCatalog::new(db.clone()));
        let mut movements = StockMovementService::new(db.clone(), entity_catalog, clock.clone())
            .with_max_conflict_retries(config.ledger.max_conflict_retries);
        let mut stock_read =
            StockReadService::new(db.clone(), clock.clone(), config.ledger.clone());
        if let Some(cache) = &cache {
            let generation = CacheGeneration::new();
            movements = movements.with_cache(cache.clone(), generation.clone());
            stock_read = stock_read.with_cache(cache.clone(), config.cache_ttl(), generation);
        }
        let valuation = ValuationService::new(db.clone());
        let dashboard =
            DashboardService::new(db.clone(), clock, stock_read.clone(), valuation.clone());

        Self {
            db,
            config,
            cache,
            catalog,
            movements,
            stock_read,
            valuation,
            dashboard,
            started_at: Instant::now(),
        }
    }
}

impl InventoryHandlerState for AppState {
    fn movement_service(&self) -> &StockMovementService {
        &self.movements
    }

    fn stock_read_service(&self) -> &StockReadService {
        &self.stock_read
    }
}

impl ReportsHandlerState for AppState {
    fn stock_read_service(&self) -> &StockReadService {
        &self.stock_read
    }

    fn valuation_service(&self) -> &ValuationService {
        &self.valuation
    }

    fn dashboard_service(&self) -> &DashboardService {
        &self.dashboard
    }
}

impl CatalogHandlerState for AppState {
    fn catalog_service(&self) -> &CatalogService {
        &self.catalog
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Routes mounted under `/api/v1`
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        // Status and health endpoints
        .route("/status", get(api_status))
        .route("/health", get(health_check))
        .nest("/inventory", handlers::inventory::inventory_router())
        .nest("/reports", handlers::reports::reports_router())
        .merge(handlers::reports::product_timeline_router())
        .merge(handlers::catalog::catalog_router())
}

/// Full application router with request ids and HTTP tracing
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::openapi_routes())
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state)
}

async fn api_status(State(state): State<AppState>) -> ApiResult<Value> {
    let git = option_env!("GIT_HASH").unwrap_or("unknown");
    let build_time = option_env!("BUILD_TIME").unwrap_or("unknown");
    let status_data = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "git": git,
        "build_time": build_time,
        "service": "stock-ledger",
        "timestamp": Utc::now().to_rfc3339(),
        "environment": state.config.environment,
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(State(state): State<AppState>) -> ApiResult<Value> {
    let db_status = match db::check_connection(&state.db).await {
        Ok(()) => "healthy",
        Err(e) => {
            ::tracing::warn!("Database health check failed: {}", e);
            "unhealthy"
        }
    };
    let cache_status = if state.cache.is_some() {
        "enabled"
    } else {
        "disabled"
    };

    let health_data = json!({
        "status": db_status,
        "checks": {
            "database": db_status,
            "cache": cache_status,
        },
        "timestamp": Utc::now().to_rfc3339(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}
