mod common;

use std::{sync::Arc, time::Duration as StdDuration};

use assert_matches::assert_matches;
use chrono::Duration;
use common::{start_time, TestApp};
use rust_decimal_macros::dec;
use stock_ledger::{
    cache::{CacheBackend, CacheError, CacheGeneration, InMemoryCache},
    config::LedgerConfig,
    entities::stock_transaction::TransactionType,
    errors::ServiceError,
    models::Triple,
    services::stock_read::{
        DeadStockQuery, LowStockQuery, ProductTimelineQuery, StockMovementsQuery,
        StockOverviewQuery, StockReadService,
    },
};

/// Cache whose misses are followed by a committed movement before the filler writes back
#[derive(Debug)]
struct CommitAfterMiss {
    inner: InMemoryCache,
    generation: CacheGeneration,
}

#[async_trait::async_trait]
impl CacheBackend for CommitAfterMiss {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let hit = self.inner.get(key).await?;
        if hit.is_none() {
            self.generation.bump();
        }
        Ok(hit)
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<StdDuration>,
    ) -> Result<(), CacheError> {
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.inner.delete(key).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        self.inner.delete_prefix(prefix).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.inner.clear().await
    }
}

fn window(days: i64) -> StockMovementsQuery {
    StockMovementsQuery {
        from_utc: start_time() - Duration::days(1),
        to_utc: start_time() - Duration::days(1) + Duration::days(days),
        warehouse_id: None,
        product_id: None,
        page: None,
        page_size: None,
    }
}

#[tokio::test]
async fn overview_lists_non_zero_balances_with_labels() {
    let app = TestApp::new().await;
    let s = app.seed().await;
    let a = Triple::new(s.product_id, s.warehouse_id, Some(s.location_a));
    let b = Triple::new(s.product_id, s.warehouse_id, Some(s.location_b));
    app.receive(a, 8, None).await.unwrap();
    app.receive(b, 2, None).await.unwrap();
    app.issue(b, 2).await.unwrap();

    let rows = app
        .state
        .stock_read
        .stock_overview(StockOverviewQuery::default())
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].product_name, "Product SKU-1");
    assert_eq!(rows[0].sku, "SKU-1");
    assert_eq!(rows[0].warehouse_code, "WH1");
    assert_eq!(rows[0].location_code.as_deref(), Some("A"));
    assert_eq!(rows[0].quantity_on_hand, 8);
}

#[tokio::test]
async fn overview_low_stock_filter_uses_min_level() {
    let app = TestApp::new().await;
    let s = app.seed().await;
    let plenty = app.product("SKU-2", 1).await;
    app.receive(Triple::new(s.product_id, s.warehouse_id, None), 5, None)
        .await
        .unwrap();
    app.receive(Triple::new(plenty, s.warehouse_id, None), 50, None)
        .await
        .unwrap();

    let rows = app
        .state
        .stock_read
        .stock_overview(StockOverviewQuery {
            low_stock_only: true,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].product_id, s.product_id);
}

#[tokio::test]
async fn overview_cache_is_invalidated_by_movements() {
    let app = TestApp::new().await;
    let s = app.seed().await;
    let triple = Triple::new(s.product_id, s.warehouse_id, None);
    app.receive(triple, 3, None).await.unwrap();

    let before = app
        .state
        .stock_read
        .stock_overview(StockOverviewQuery::default())
        .await
        .unwrap();
    assert_eq!(before[0].quantity_on_hand, 3);

    app.receive(triple, 4, None).await.unwrap();

    let after = app
        .state
        .stock_read
        .stock_overview(StockOverviewQuery::default())
        .await
        .unwrap();
    assert_eq!(after[0].quantity_on_hand, 7);
}

#[tokio::test]
async fn overview_read_overtaken_by_a_movement_is_not_cached() {
    let app = TestApp::new().await;
    let s = app.seed().await;
    app.receive(Triple::new(s.product_id, s.warehouse_id, None), 3, None)
        .await
        .unwrap();

    let store = InMemoryCache::new();
    let generation = CacheGeneration::new();
    let racing = StockReadService::new(
        app.state.db.clone(),
        Arc::new(app.clock.clone()),
        LedgerConfig::default(),
    )
    .with_cache(
        Arc::new(CommitAfterMiss {
            inner: store.clone(),
            generation: generation.clone(),
        }),
        StdDuration::from_secs(60),
        generation,
    );

    let rows = racing
        .stock_overview(StockOverviewQuery::default())
        .await
        .unwrap();
    assert_eq!(rows[0].quantity_on_hand, 3);
    assert!(store.is_empty());

    let quiet_store = InMemoryCache::new();
    let quiet = StockReadService::new(
        app.state.db.clone(),
        Arc::new(app.clock.clone()),
        LedgerConfig::default(),
    )
    .with_cache(
        Arc::new(quiet_store.clone()),
        StdDuration::from_secs(60),
        CacheGeneration::new(),
    );
    quiet
        .stock_overview(StockOverviewQuery::default())
        .await
        .unwrap();
    assert_eq!(quiet_store.len(), 1);
}

#[tokio::test]
async fn movements_are_newest_first_and_paged() {
    let app = TestApp::new().await;
    let s = app.seed().await;
    let triple = Triple::new(s.product_id, s.warehouse_id, Some(s.location_a));
    app.receive(triple, 10, Some(dec!(1.50))).await.unwrap();
    app.clock.advance(Duration::minutes(1));
    app.issue(triple, 2).await.unwrap();
    app.clock.advance(Duration::minutes(1));
    app.adjust(triple, -1).await.unwrap();

    let page = app
        .state
        .stock_read
        .stock_movements(StockMovementsQuery {
            page_size: Some(2),
            ..window(7)
        })
        .await
        .unwrap();

    assert_eq!(page.total, 3);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].transaction_type, TransactionType::Adjust);
    assert_eq!(page.items[1].transaction_type, TransactionType::Out);
    assert_eq!(page.items[0].location_code.as_deref(), Some("A"));

    let second = app
        .state
        .stock_read
        .stock_movements(StockMovementsQuery {
            page: Some(2),
            page_size: Some(2),
            ..window(7)
        })
        .await
        .unwrap();
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.items[0].transaction_type, TransactionType::In);
    assert_eq!(second.items[0].unit_cost, Some(dec!(1.50)));
}

#[tokio::test]
async fn movement_window_must_be_ordered_and_bounded() {
    let app = TestApp::new().await;

    let reversed = StockMovementsQuery {
        from_utc: start_time(),
        to_utc: start_time() - Duration::hours(1),
        ..window(1)
    };
    assert_matches!(
        app.state.stock_read.stock_movements(reversed).await,
        Err(ServiceError::ValidationError(ref msg)) if msg == "Invalid date range."
    );

    assert_matches!(
        app.state.stock_read.stock_movements(window(32)).await,
        Err(ServiceError::ValidationError(_))
    );
    assert!(app.state.stock_read.stock_movements(window(31)).await.is_ok());
}

#[tokio::test]
async fn movements_outside_the_window_are_excluded() {
    let app = TestApp::new().await;
    let s = app.seed().await;
    let triple = Triple::new(s.product_id, s.warehouse_id, None);
    app.receive(triple, 1, None).await.unwrap();
    app.clock.advance(Duration::days(10));
    app.receive(triple, 1, None).await.unwrap();

    let page = app
        .state
        .stock_read
        .stock_movements(window(5))
        .await
        .unwrap();

    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].created_at, start_time());
}

#[tokio::test]
async fn timeline_defaults_to_the_last_thirty_days() {
    let app = TestApp::new().await;
    let s = app.seed().await;
    let other = app.product("SKU-2", 0).await;
    let triple = Triple::new(s.product_id, s.warehouse_id, None);
    app.receive(triple, 5, None).await.unwrap();
    app.receive(Triple::new(other, s.warehouse_id, None), 5, None)
        .await
        .unwrap();
    app.clock.advance(Duration::days(40));
    app.issue(triple, 1).await.unwrap();

    let page = app
        .state
        .stock_read
        .product_timeline(s.product_id, ProductTimelineQuery::default())
        .await
        .unwrap();

    assert_eq!(page.total, 1);
    assert_eq!(page.page_size, 20);
    assert_eq!(page.items[0].transaction_type, TransactionType::Out);
    assert_eq!(page.items[0].quantity_delta, -1);

    assert_matches!(
        app.state
            .stock_read
            .product_timeline(0, ProductTimelineQuery::default())
            .await,
        Err(ServiceError::ValidationError(ref msg)) if msg == "Invalid product ID."
    );
}

#[tokio::test]
async fn low_stock_reports_shortage() {
    let app = TestApp::new().await;
    let s = app.seed().await;
    let triple = Triple::new(s.product_id, s.warehouse_id, Some(s.location_a));
    app.receive(triple, 2, None).await.unwrap();
    app.receive(Triple::new(s.product_id, s.warehouse_id, Some(s.location_b)), 9, None)
        .await
        .unwrap();

    let rows = app
        .state
        .stock_read
        .low_stock(LowStockQuery::default())
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].location_id, Some(s.location_a));
    assert_eq!(rows[0].min_stock_level, 5);
    assert_eq!(rows[0].shortage, 3);
}

#[tokio::test]
async fn dead_stock_lists_positive_balances_without_recent_movement() {
    let app = TestApp::new().await;
    let s = app.seed().await;
    let active = app.product("SKU-2", 0).await;
    let idle = Triple::new(s.product_id, s.warehouse_id, None);
    let busy = Triple::new(active, s.warehouse_id, None);
    app.receive(idle, 4, None).await.unwrap();
    app.receive(busy, 4, None).await.unwrap();

    app.clock.advance(Duration::days(45));
    app.issue(busy, 1).await.unwrap();

    let rows = app
        .state
        .stock_read
        .dead_stock(DeadStockQuery::default())
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].product_id, s.product_id);
    assert_eq!(rows[0].quantity_on_hand, 4);
    assert_eq!(rows[0].last_movement_at, Some(start_time()));
    assert_eq!(rows[0].days_since_last_movement, 45);

    let strict = app
        .state
        .stock_read
        .dead_stock(DeadStockQuery {
            days: Some(60),
            warehouse_id: None,
        })
        .await
        .unwrap();
    assert!(strict.is_empty());

    assert_matches!(
        app.state
            .stock_read
            .dead_stock(DeadStockQuery {
                days: Some(0),
                warehouse_id: None,
            })
            .await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn dashboard_summarizes_catalog_and_stock_health() {
    let app = TestApp::new().await;
    let s = app.seed().await;
    let busy = app.product("SKU-2", 0).await;
    let idle = Triple::new(s.product_id, s.warehouse_id, None);
    let moving = Triple::new(busy, s.warehouse_id, None);
    app.receive(idle, 4, Some(dec!(5.00))).await.unwrap();
    app.receive(moving, 10, Some(dec!(2.00))).await.unwrap();

    app.clock.advance(Duration::days(45));
    app.issue(moving, 1).await.unwrap();

    let summary = app.state.dashboard.summary().await.unwrap();

    assert_eq!(summary.total_products, 2);
    assert_eq!(summary.active_products, 2);
    assert_eq!(summary.total_warehouses, 1);
    assert_eq!(summary.active_warehouses, 1);
    assert_eq!(summary.low_stock_items, 1);
    assert_eq!(summary.dead_stock_items, 1);
    assert_eq!(summary.total_stock_value, dec!(38.00));
    assert_eq!(summary.generated_at, start_time() + Duration::days(45));
}
