use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Stock Ledger API",
        version = "1.0.0",
        description = r#"
# Stock Ledger API

Append-only stock movement ledger with per-location balance snapshots.

- **Movements**: receive, issue, transfer and adjust stock. Each call writes ledger rows and
  balance snapshots atomically and returns the id of the ledger row it created.
- **Reports**: stock overview, movements in a window, product timeline, low stock, dead stock
  and FIFO or weighted-average valuation.

## Actors

Pass `x-actor-id` and `x-actor-name` on movement requests to record who made the change.

## Error Handling

Errors share one body:

```json
{
  "error": "Unprocessable Entity",
  "message": "Insufficient stock.",
  "request_id": "...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "inventory", description = "Stock movements and overview"),
        (name = "reports", description = "Stock reports and valuation"),
        (name = "catalog", description = "Products, warehouses and locations")
    ),
    paths(
        // Inventory
        crate::handlers::inventory::receive_stock,
        crate::handlers::inventory::issue_stock,
        crate::handlers::inventory::transfer_stock,
        crate::handlers::inventory::adjust_stock,
        crate::handlers::inventory::stock_overview,

        // Reports
        crate::handlers::reports::stock_movements,
        crate::handlers::reports::product_timeline,
        crate::handlers::reports::low_stock,
        crate::handlers::reports::dead_stock,
        crate::handlers::reports::stock_valuation,
        crate::handlers::reports::dashboard_summary,

        // Catalog
        crate::handlers::catalog::create_product,
        crate::handlers::catalog::list_products,
        crate::handlers::catalog::create_warehouse,
        crate::handlers::catalog::list_warehouses,
        crate::handlers::catalog::create_location,
        crate::handlers::catalog::list_locations,
    ),
    components(
        schemas(
            crate::handlers::common::MovementRecorded,
            crate::services::movements::ReceiveStock,
            crate::services::movements::IssueStock,
            crate::services::movements::TransferStock,
            crate::services::movements::AdjustStock,
            crate::services::stock_read::StockOverviewRow,
            crate::services::stock_read::StockMovementRow,
            crate::services::stock_read::LowStockRow,
            crate::services::stock_read::DeadStockRow,
            crate::services::valuation::ValuationRow,
            crate::services::dashboard::DashboardSummary,
            crate::models::ValuationMode,
            crate::entities::stock_transaction::TransactionType,
            crate::services::catalog::CreateProductRequest,
            crate::services::catalog::CreateWarehouseRequest,
            crate::services::catalog::CreateLocationRequest,
            crate::services::catalog::ProductSummary,
            crate::services::catalog::WarehouseSummary,
            crate::services::catalog::LocationSummary,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

/// Serves the generated document at `/api-docs/openapi.json`
pub fn openapi_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDocV1::openapi()) }),
    )
}
