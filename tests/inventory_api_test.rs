mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use serde_json::json;

#[tokio::test]
async fn receive_issue_and_overview_over_http() {
    let app = TestApp::new().await;
    let s = app.seed().await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/inventory/receive",
            Some(json!({
                "product_id": s.product_id,
                "warehouse_id": s.warehouse_id,
                "location_id": s.location_a,
                "quantity": 10,
                "unit_cost": "5.00",
                "reference_type": "PO",
                "reference_id": "PO-1"
            })),
            &[("x-actor-id", "3"), ("x-actor-name", "Receiver")],
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["success"], true);
    assert!(body["data"]["transaction_id"].as_i64().unwrap() > 0);

    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/inventory/issue",
            Some(json!({
                "product_id": s.product_id,
                "warehouse_id": s.warehouse_id,
                "location_id": s.location_a,
                "quantity": 4
            })),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .request(Method::GET, "/api/v1/inventory/overview", None, &[])
        .await;
    assert_eq!(status, StatusCode::OK);
    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["quantity_on_hand"], 6);
    assert_eq!(rows[0]["location_code"], "A");
}

#[tokio::test]
async fn insufficient_stock_maps_to_unprocessable_entity() {
    let app = TestApp::new().await;
    let s = app.seed().await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/inventory/issue",
            Some(json!({
                "product_id": s.product_id,
                "warehouse_id": s.warehouse_id,
                "quantity": 100
            })),
            &[("x-request-id", "req-issue-1")],
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["message"], "Insufficient stock.");
    assert_eq!(body["request_id"], "req-issue-1");
}

#[tokio::test]
async fn transfer_and_adjust_over_http() {
    let app = TestApp::new().await;
    let s = app.seed().await;
    app.request(
        Method::POST,
        "/api/v1/inventory/receive",
        Some(json!({
            "product_id": s.product_id,
            "warehouse_id": s.warehouse_id,
            "location_id": s.location_a,
            "quantity": 4
        })),
        &[],
    )
    .await;

    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/inventory/transfer",
            Some(json!({
                "product_id": s.product_id,
                "from_warehouse_id": s.warehouse_id,
                "from_location_id": s.location_a,
                "to_warehouse_id": s.warehouse_id,
                "to_location_id": s.location_b,
                "quantity": 4
            })),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/inventory/adjust",
            Some(json!({
                "product_id": s.product_id,
                "warehouse_id": s.warehouse_id,
                "location_id": s.location_a,
                "quantity_delta": -1,
                "reason": "shrinkage"
            })),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body["message"],
        "Stock adjustment would result in negative stock balance."
    );
}

#[tokio::test]
async fn unknown_product_is_not_found_and_bad_actor_is_rejected() {
    let app = TestApp::new().await;
    let s = app.seed().await;
    let payload = json!({
        "product_id": 4040,
        "warehouse_id": s.warehouse_id,
        "quantity": 1
    });

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/inventory/receive",
            Some(payload.clone()),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Product not found");

    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/inventory/receive",
            Some(payload),
            &[("x-actor-id", "not-a-number")],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reports_are_served() {
    let app = TestApp::new().await;
    let s = app.seed().await;
    app.request(
        Method::POST,
        "/api/v1/inventory/receive",
        Some(json!({
            "product_id": s.product_id,
            "warehouse_id": s.warehouse_id,
            "quantity": 2,
            "unit_cost": "3.00"
        })),
        &[],
    )
    .await;

    let (status, body) = app
        .request(
            Method::GET,
            "/api/v1/reports/stock-movements?from_utc=2025-02-28T00:00:00Z&to_utc=2025-03-02T00:00:00Z",
            None,
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["type"], "IN");

    let (status, body) = app
        .request(
            Method::GET,
            "/api/v1/reports/stock-movements?from_utc=2025-03-02T00:00:00Z&to_utc=2025-02-28T00:00:00Z",
            None,
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid date range.");

    let (status, body) = app
        .request(
            Method::GET,
            "/api/v1/reports/stock-valuation?mode=weighted_average",
            None,
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["quantity_on_hand"], 2);

    let (status, body) = app
        .request(Method::GET, "/api/v1/reports/low-stock", None, &[])
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["shortage"], 3);

    let (status, body) = app
        .request(Method::GET, "/api/v1/reports/dead-stock?days=10", None, &[])
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 0);

    let (status, body) = app
        .request(Method::GET, "/api/v1/reports/dashboard", None, &[])
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_products"], 1);
    assert_eq!(body["data"]["low_stock_items"], 1);
    let total_value: f64 = body["data"]["total_stock_value"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(total_value, 6.0);

    let uri = format!("/api/v1/products/{}/timeline", s.product_id);
    let (status, body) = app.request(Method::GET, &uri, None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
}

#[tokio::test]
async fn catalog_endpoints_create_and_list() {
    let app = TestApp::new().await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/warehouses",
            Some(json!({ "name": "Main", "code": "MAIN" })),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let warehouse_id = body["data"]["id"].as_i64().unwrap();

    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/locations",
            Some(json!({ "warehouse_id": warehouse_id, "code": "BIN-1" })),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/products",
            Some(json!({ "name": "Widget", "sku": "W-1", "min_stock_level": 2 })),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/products",
            Some(json!({ "name": "Widget again", "sku": "W-1" })),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .request(Method::GET, "/api/v1/products?page=1&per_page=10", None, &[])
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);

    let uri = format!("/api/v1/locations?warehouse_id={warehouse_id}");
    let (status, body) = app.request(Method::GET, &uri, None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["code"], "BIN-1");
}

#[tokio::test]
async fn status_health_and_openapi_are_exposed() {
    let app = TestApp::new().await;

    let (status, body) = app.request(Method::GET, "/api/v1/status", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["service"], "stock-ledger");

    let (status, body) = app.request(Method::GET, "/api/v1/health", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["checks"]["database"], "healthy");

    let (status, body) = app
        .request(Method::GET, "/api-docs/openapi.json", None, &[])
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/api/v1/inventory/receive"].is_object());
}
