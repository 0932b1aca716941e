#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::Value;
use stock_ledger::{
    clock::{Clock, ManualClock},
    config::AppConfig,
    db,
    entities::{stock_balance, stock_transaction},
    models::{Actor, MovementContext, Triple},
    services::{
        catalog::{CreateLocationRequest, CreateProductRequest, CreateWarehouseRequest},
        movements::{AdjustStock, IssueStock, ReceiveStock, TransferStock},
    },
    AppState,
};
use tempfile::TempDir;
use tower::ServiceExt;

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

/// Catalog ids created by [`TestApp::seed`]
#[derive(Debug, Clone, Copy)]
pub struct Seeded {
    pub product_id: i32,
    pub warehouse_id: i32,
    pub location_a: i32,
    pub location_b: i32,
}

/// Application state over a throwaway SQLite file and a manual clock.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub clock: ManualClock,
    _dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("ledger_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // One connection keeps SQLite writers strictly serialized
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        customize(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let clock = ManualClock::new(start_time());
        let state = AppState::with_clock(Arc::new(pool), cfg, Arc::new(clock.clone()));
        let router = stock_ledger::app_router(state.clone());

        Self {
            router,
            state,
            clock,
            _dir: dir,
        }
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.state.db
    }

    pub fn ctx(&self) -> MovementContext {
        MovementContext::new(Actor::new(Some(7), Some("tester".to_string())))
    }

    /// One product (min stock 5), one warehouse and two locations in it
    pub async fn seed(&self) -> Seeded {
        let product_id = self.product("SKU-1", 5).await;
        let warehouse_id = self.warehouse("WH1").await;
        let location_a = self.location(warehouse_id, "A").await;
        let location_b = self.location(warehouse_id, "B").await;
        Seeded {
            product_id,
            warehouse_id,
            location_a,
            location_b,
        }
    }

    pub async fn product(&self, sku: &str, min_stock_level: i32) -> i32 {
        self.state
            .catalog
            .create_product(CreateProductRequest {
                name: format!("Product {sku}"),
                sku: sku.to_string(),
                barcode: None,
                min_stock_level,
            })
            .await
            .expect("create product")
            .id
    }

    pub async fn warehouse(&self, code: &str) -> i32 {
        self.state
            .catalog
            .create_warehouse(CreateWarehouseRequest {
                name: format!("Warehouse {code}"),
                code: code.to_string(),
            })
            .await
            .expect("create warehouse")
            .id
    }

    pub async fn location(&self, warehouse_id: i32, code: &str) -> i32 {
        self.state
            .catalog
            .create_location(CreateLocationRequest {
                warehouse_id,
                code: code.to_string(),
            })
            .await
            .expect("create location")
            .id
    }

    pub async fn receive(
        &self,
        triple: Triple,
        quantity: i32,
        unit_cost: Option<Decimal>,
    ) -> Result<i32, stock_ledger::errors::ServiceError> {
        self.state
            .movements
            .receive(
                &self.ctx(),
                ReceiveStock {
                    product_id: triple.product_id,
                    warehouse_id: triple.warehouse_id,
                    location_id: triple.location_id,
                    quantity,
                    unit_cost,
                    reference_type: None,
                    reference_id: None,
                },
            )
            .await
    }

    pub async fn issue(
        &self,
        triple: Triple,
        quantity: i32,
    ) -> Result<i32, stock_ledger::errors::ServiceError> {
        self.state
            .movements
            .issue(
                &self.ctx(),
                IssueStock {
                    product_id: triple.product_id,
                    warehouse_id: triple.warehouse_id,
                    location_id: triple.location_id,
                    quantity,
                    reference_type: None,
                    reference_id: None,
                },
            )
            .await
    }

    pub async fn adjust(
        &self,
        triple: Triple,
        quantity_delta: i32,
    ) -> Result<i32, stock_ledger::errors::ServiceError> {
        self.state
            .movements
            .adjust(
                &self.ctx(),
                AdjustStock {
                    product_id: triple.product_id,
                    warehouse_id: triple.warehouse_id,
                    location_id: triple.location_id,
                    quantity_delta,
                    reason: "cycle count".to_string(),
                    reference_type: None,
                    reference_id: None,
                },
            )
            .await
    }

    pub async fn transfer(
        &self,
        from: Triple,
        to: Triple,
        quantity: i32,
    ) -> Result<i32, stock_ledger::errors::ServiceError> {
        self.state
            .movements
            .transfer(
                &self.ctx(),
                TransferStock {
                    product_id: from.product_id,
                    from_warehouse_id: from.warehouse_id,
                    from_location_id: from.location_id,
                    to_warehouse_id: to.warehouse_id,
                    to_location_id: to.location_id,
                    quantity,
                    reference_type: Some("transfer".to_string()),
                    reference_id: Some("T-1".to_string()),
                },
            )
            .await
    }

    pub async fn balance(&self, triple: Triple) -> Option<stock_balance::Model> {
        stock_balance::Entity::find()
            .filter(stock_balance::Column::TripleKey.eq(triple.key()))
            .one(self.db())
            .await
            .expect("load balance")
    }

    pub async fn on_hand(&self, triple: Triple) -> i32 {
        self.balance(triple).await.map_or(0, |b| b.quantity_on_hand)
    }

    pub async fn ledger_sum(&self, triple: Triple) -> i32 {
        self.ledger(triple)
            .await
            .iter()
            .map(|tx| tx.quantity_delta)
            .sum()
    }

    pub async fn ledger(&self, triple: Triple) -> Vec<stock_transaction::Model> {
        let mut query = stock_transaction::Entity::find()
            .filter(stock_transaction::Column::ProductId.eq(triple.product_id))
            .filter(stock_transaction::Column::WarehouseId.eq(triple.warehouse_id));
        query = match triple.location_id {
            Some(location_id) => {
                query.filter(stock_transaction::Column::LocationId.eq(location_id))
            }
            None => query.filter(stock_transaction::Column::LocationId.is_null()),
        };
        query.all(self.db()).await.expect("load ledger")
    }

    pub async fn ledger_count(&self) -> u64 {
        stock_transaction::Entity::find()
            .count(self.db())
            .await
            .expect("count ledger")
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}
