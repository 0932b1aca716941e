use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    clock::Clock,
    db::is_unique_violation,
    entities::{location, product, warehouse},
    errors::ServiceError,
    models::Triple,
    services::Page,
};

/// Existence checks the movement operations need from the catalog.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EntityCatalog: Send + Sync {
    async fn product_exists(&self, product_id: i32) -> Result<bool, ServiceError>;
    async fn warehouse_exists(&self, warehouse_id: i32) -> Result<bool, ServiceError>;
    async fn location_in_warehouse(
        &self,
        location_id: i32,
        warehouse_id: i32,
    ) -> Result<bool, ServiceError>;
}

/// Fails with `NotFound` unless the product, the warehouse and (when given) the
/// location inside that warehouse all exist.
pub async fn ensure_triple_exists(
    catalog: &dyn EntityCatalog,
    triple: Triple,
) -> Result<(), ServiceError> {
    if !catalog.product_exists(triple.product_id).await? {
        return Err(ServiceError::NotFound("Product not found".to_string()));
    }
    if !catalog.warehouse_exists(triple.warehouse_id).await? {
        return Err(ServiceError::NotFound("Warehouse not found".to_string()));
    }
    if let Some(location_id) = triple.location_id {
        if !catalog
            .location_in_warehouse(location_id, triple.warehouse_id)
            .await?
        {
            return Err(ServiceError::NotFound(
                "Location not found in the specified warehouse".to_string(),
            ));
        }
    }
    Ok(())
}

/// [`EntityCatalog`] backed by the catalog tables
#[derive(Clone)]
pub struct DbEntityCatalog {
    db: Arc<DatabaseConnection>,
}

impl DbEntityCatalog {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl EntityCatalog for DbEntityCatalog {
    async fn product_exists(&self, product_id: i32) -> Result<bool, ServiceError> {
        let count = product::Entity::find_by_id(product_id)
            .count(&*self.db)
            .await?;
        Ok(count > 0)
    }

    async fn warehouse_exists(&self, warehouse_id: i32) -> Result<bool, ServiceError> {
        let count = warehouse::Entity::find_by_id(warehouse_id)
            .count(&*self.db)
            .await?;
        Ok(count > 0)
    }

    async fn location_in_warehouse(
        &self,
        location_id: i32,
        warehouse_id: i32,
    ) -> Result<bool, ServiceError> {
        let count = location::Entity::find_by_id(location_id)
            .filter(location::Column::WarehouseId.eq(warehouse_id))
            .count(&*self.db)
            .await?;
        Ok(count > 0)
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 64))]
    pub sku: String,
    #[validate(length(min = 1, max = 64))]
    pub barcode: Option<String>,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub min_stock_level: i32,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateWarehouseRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 32))]
    pub code: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateLocationRequest {
    pub warehouse_id: i32,
    #[validate(length(min = 1, max = 32))]
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductSummary {
    pub id: i32,
    pub name: String,
    pub sku: String,
    pub barcode: Option<String>,
    pub min_stock_level: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<product::Model> for ProductSummary {
    fn from(model: product::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            sku: model.sku,
            barcode: model.barcode,
            min_stock_level: model.min_stock_level,
            is_active: model.is_active,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WarehouseSummary {
    pub id: i32,
    pub name: String,
    pub code: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<warehouse::Model> for WarehouseSummary {
    fn from(model: warehouse::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            code: model.code,
            is_active: model.is_active,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LocationSummary {
    pub id: i32,
    pub warehouse_id: i32,
    pub code: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<location::Model> for LocationSummary {
    fn from(model: location::Model) -> Self {
        Self {
            id: model.id,
            warehouse_id: model.warehouse_id,
            code: model.code,
            is_active: model.is_active,
            created_at: model.created_at,
        }
    }
}

/// Minimal product, warehouse and location management
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
    clock: Arc<dyn Clock>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    #[instrument(skip(self, request), fields(sku = %request.sku))]
    pub async fn create_product(
        &self,
        request: CreateProductRequest,
    ) -> Result<ProductSummary, ServiceError> {
        request.validate()?;

        let model = product::ActiveModel {
            name: Set(request.name.trim().to_string()),
            sku: Set(request.sku.trim().to_string()),
            barcode: Set(request
                .barcode
                .map(|b| b.trim().to_string())
                .filter(|b| !b.is_empty())),
            min_stock_level: Set(request.min_stock_level),
            is_active: Set(true),
            created_at: Set(self.clock.now()),
            updated_at: Set(None),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::Conflict("A product with this SKU or barcode already exists".into())
            } else {
                ServiceError::db_error(e)
            }
        })?;

        info!(product_id = model.id, "Product created");
        Ok(model.into())
    }

    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<Page<ProductSummary>, ServiceError> {
        let paginator = product::Entity::find()
            .order_by_asc(product::Column::Id)
            .paginate(&*self.db, per_page.max(1));
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok(Page::new(
            items.into_iter().map(ProductSummary::from).collect(),
            page,
            per_page,
            total,
        ))
    }

    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create_warehouse(
        &self,
        request: CreateWarehouseRequest,
    ) -> Result<WarehouseSummary, ServiceError> {
        request.validate()?;

        let model = warehouse::ActiveModel {
            name: Set(request.name.trim().to_string()),
            code: Set(request.code.trim().to_string()),
            is_active: Set(true),
            created_at: Set(self.clock.now()),
            updated_at: Set(None),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::Conflict("A warehouse with this code already exists".into())
            } else {
                ServiceError::db_error(e)
            }
        })?;

        info!(warehouse_id = model.id, "Warehouse created");
        Ok(model.into())
    }

    #[instrument(skip(self))]
    pub async fn list_warehouses(&self) -> Result<Vec<WarehouseSummary>, ServiceError> {
        let rows = warehouse::Entity::find()
            .order_by_asc(warehouse::Column::Code)
            .all(&*self.db)
            .await?;
        Ok(rows.into_iter().map(WarehouseSummary::from).collect())
    }

    #[instrument(skip(self, request), fields(warehouse_id = request.warehouse_id, code = %request.code))]
    pub async fn create_location(
        &self,
        request: CreateLocationRequest,
    ) -> Result<LocationSummary, ServiceError> {
        request.validate()?;

        if warehouse::Entity::find_by_id(request.warehouse_id)
            .one(&*self.db)
            .await?
            .is_none()
        {
            return Err(ServiceError::NotFound("Warehouse not found".to_string()));
        }

        let model = location::ActiveModel {
            warehouse_id: Set(request.warehouse_id),
            code: Set(request.code.trim().to_string()),
            is_active: Set(true),
            created_at: Set(self.clock.now()),
            updated_at: Set(None),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::Conflict(
                    "A location with this code already exists in the warehouse".into(),
                )
            } else {
                ServiceError::db_error(e)
            }
        })?;

        info!(location_id = model.id, "Location created");
        Ok(model.into())
    }

    #[instrument(skip(self))]
    pub async fn list_locations(
        &self,
        warehouse_id: Option<i32>,
    ) -> Result<Vec<LocationSummary>, ServiceError> {
        let mut query = location::Entity::find();
        if let Some(warehouse_id) = warehouse_id {
            query = query.filter(location::Column::WarehouseId.eq(warehouse_id));
        }
        let rows = query
            .order_by_asc(location::Column::WarehouseId)
            .order_by_asc(location::Column::Code)
            .all(&*self.db)
            .await?;
        Ok(rows.into_iter().map(LocationSummary::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use mockall::predicate::eq;

    #[tokio::test]
    async fn missing_product_is_reported_first() {
        let mut catalog = MockEntityCatalog::new();
        catalog
            .expect_product_exists()
            .with(eq(7))
            .returning(|_| Ok(false));
        catalog.expect_warehouse_exists().never();

        let result = ensure_triple_exists(&catalog, Triple::new(7, 1, None)).await;
        assert_matches!(result, Err(ServiceError::NotFound(msg)) if msg == "Product not found");
    }

    #[tokio::test]
    async fn missing_warehouse_is_not_found() {
        let mut catalog = MockEntityCatalog::new();
        catalog.expect_product_exists().returning(|_| Ok(true));
        catalog.expect_warehouse_exists().returning(|_| Ok(false));

        let result = ensure_triple_exists(&catalog, Triple::new(1, 9, None)).await;
        assert_matches!(result, Err(ServiceError::NotFound(msg)) if msg == "Warehouse not found");
    }

    #[tokio::test]
    async fn location_must_belong_to_the_warehouse() {
        let mut catalog = MockEntityCatalog::new();
        catalog.expect_product_exists().returning(|_| Ok(true));
        catalog.expect_warehouse_exists().returning(|_| Ok(true));
        catalog
            .expect_location_in_warehouse()
            .with(eq(3), eq(1))
            .returning(|_, _| Ok(false));

        let result = ensure_triple_exists(&catalog, Triple::new(1, 1, Some(3))).await;
        assert_matches!(
            result,
            Err(ServiceError::NotFound(msg)) if msg == "Location not found in the specified warehouse"
        );
    }

    #[tokio::test]
    async fn warehouse_level_triple_skips_location_lookup() {
        let mut catalog = MockEntityCatalog::new();
        catalog.expect_product_exists().returning(|_| Ok(true));
        catalog.expect_warehouse_exists().returning(|_| Ok(true));
        catalog.expect_location_in_warehouse().never();

        assert!(ensure_triple_exists(&catalog, Triple::new(1, 1, None))
            .await
            .is_ok());
    }
}
