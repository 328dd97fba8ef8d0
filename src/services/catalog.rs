use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, DatabaseTransaction, EntityTrait,
    QueryFilter,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::entities::{product, product_variant};
use crate::errors::ServiceError;
use crate::money::Cents;

/// Catalog key of a purchasable item.
pub type ItemKey = (Uuid, Option<Uuid>);

/// What the storefront needs to know about one purchasable item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub name: String,
    pub price: Cents,
    pub stock: i32,
    pub category_id: Option<Uuid>,
}

/// Read and stock-adjustment contract with the product catalog.
///
/// `lookup` returns `None` for unknown or inactive products and for variants
/// that do not belong to the given product. Stock adjustments run inside
/// the caller's transaction.
#[async_trait]
pub trait CatalogGateway: Send + Sync {
    async fn lookup(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
    ) -> Result<Option<CatalogEntry>, ServiceError>;

    async fn lookup_many(
        &self,
        keys: &[ItemKey],
    ) -> Result<HashMap<ItemKey, CatalogEntry>, ServiceError> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if found.contains_key(key) {
                continue;
            }
            if let Some(entry) = self.lookup(key.0, key.1).await? {
                found.insert(*key, entry);
            }
        }
        Ok(found)
    }

    async fn price(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
    ) -> Result<Cents, ServiceError> {
        self.lookup(product_id, variant_id)
            .await?
            .map(|entry| entry.price)
            .ok_or_else(|| not_found(product_id, variant_id))
    }

    async fn stock(&self, product_id: Uuid, variant_id: Option<Uuid>) -> Result<i32, ServiceError> {
        self.lookup(product_id, variant_id)
            .await?
            .map(|entry| entry.stock)
            .ok_or_else(|| not_found(product_id, variant_id))
    }

    /// Decrements stock only if at least `quantity` is available.
    async fn decrement_stock(
        &self,
        txn: &DatabaseTransaction,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: i32,
    ) -> Result<(), ServiceError>;

    async fn restock(
        &self,
        txn: &DatabaseTransaction,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: i32,
    ) -> Result<(), ServiceError>;
}

pub(crate) fn not_found(product_id: Uuid, variant_id: Option<Uuid>) -> ServiceError {
    match variant_id {
        Some(variant_id) => ServiceError::NotFound(format!(
            "Variant {} of product {} not found",
            variant_id, product_id
        )),
        None => ServiceError::NotFound(format!("Product {} not found", product_id)),
    }
}

/// Catalog backed by the `products` and `product_variants` tables.
#[derive(Clone)]
pub struct DbCatalog {
    db: Arc<DatabaseConnection>,
}

impl DbCatalog {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CatalogGateway for DbCatalog {
    async fn lookup(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
    ) -> Result<Option<CatalogEntry>, ServiceError> {
        let db = &*self.db;
        let Some(product) = product::Entity::find_by_id(product_id).one(db).await? else {
            return Ok(None);
        };
        if !product.is_active {
            return Ok(None);
        }

        let entry = match variant_id {
            None => CatalogEntry {
                product_id,
                variant_id: None,
                name: product.name,
                price: product.price,
                stock: product.stock,
                category_id: product.category_id,
            },
            Some(variant_id) => {
                let variant = product_variant::Entity::find_by_id(variant_id)
                    .filter(product_variant::Column::ProductId.eq(product_id))
                    .one(db)
                    .await?;
                let Some(variant) = variant else {
                    return Ok(None);
                };
                CatalogEntry {
                    product_id,
                    variant_id: Some(variant_id),
                    name: format!("{} ({})", product.name, variant.name),
                    price: variant.price,
                    stock: variant.stock,
                    category_id: product.category_id,
                }
            }
        };

        Ok(Some(entry))
    }

    async fn decrement_stock(
        &self,
        txn: &DatabaseTransaction,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let now = Utc::now();
        let rows_affected = match variant_id {
            None => {
                product::Entity::update_many()
                    .col_expr(
                        product::Column::Stock,
                        Expr::col(product::Column::Stock).sub(quantity),
                    )
                    .col_expr(product::Column::UpdatedAt, Expr::value(now))
                    .filter(product::Column::Id.eq(product_id))
                    .filter(product::Column::Stock.gte(quantity))
                    .exec(txn)
                    .await?
                    .rows_affected
            }
            Some(variant_id) => {
                product_variant::Entity::update_many()
                    .col_expr(
                        product_variant::Column::Stock,
                        Expr::col(product_variant::Column::Stock).sub(quantity),
                    )
                    .col_expr(product_variant::Column::UpdatedAt, Expr::value(now))
                    .filter(product_variant::Column::Id.eq(variant_id))
                    .filter(product_variant::Column::ProductId.eq(product_id))
                    .filter(product_variant::Column::Stock.gte(quantity))
                    .exec(txn)
                    .await?
                    .rows_affected
            }
        };

        if rows_affected == 0 {
            return Err(ServiceError::OutOfStock(format!(
                "Insufficient stock for product {}{}",
                product_id,
                variant_id
                    .map(|v| format!(" variant {}", v))
                    .unwrap_or_default()
            )));
        }
        Ok(())
    }

    async fn restock(
        &self,
        txn: &DatabaseTransaction,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let now = Utc::now();
        let rows_affected = match variant_id {
            None => {
                product::Entity::update_many()
                    .col_expr(
                        product::Column::Stock,
                        Expr::col(product::Column::Stock).add(quantity),
                    )
                    .col_expr(product::Column::UpdatedAt, Expr::value(now))
                    .filter(product::Column::Id.eq(product_id))
                    .exec(txn)
                    .await?
                    .rows_affected
            }
            Some(variant_id) => {
                product_variant::Entity::update_many()
                    .col_expr(
                        product_variant::Column::Stock,
                        Expr::col(product_variant::Column::Stock).add(quantity),
                    )
                    .col_expr(product_variant::Column::UpdatedAt, Expr::value(now))
                    .filter(product_variant::Column::Id.eq(variant_id))
                    .exec(txn)
                    .await?
                    .rows_affected
            }
        };

        if rows_affected == 0 {
            warn!(%product_id, ?variant_id, quantity, "restock skipped: item no longer in catalog");
        }
        Ok(())
    }
}
