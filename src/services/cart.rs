use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{Actor, Capability};
use crate::entities::{cart, cart_item};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::money::{line_total, serialize_cents, serialize_optional_cents, Cents};
use crate::services::catalog::{not_found, CatalogGateway};
use crate::services::discounts::DiscountBreakdown;
use crate::services::pricing::{PricingService, RepricedItem};

/// Per-owner async locks serializing cart mutations and checkout.
#[derive(Clone, Default)]
pub struct CartLocks {
    inner: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl CartLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, owner_id: Uuid) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the shard lock is released before awaiting.
        let lock = self.inner.entry(owner_id).or_default().clone();
        lock.lock_owned().await
    }

    /// Drops locks nobody holds or waits on.
    pub fn prune_idle(&self) -> usize {
        let before = self.inner.len();
        self.inner.retain(|_, lock| Arc::strong_count(lock) > 1);
        before.saturating_sub(self.inner.len())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Owns each user's cart. Every mutation runs under the owner's
/// [`CartLocks`] entry and bumps the cart version.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    catalog: Arc<dyn CatalogGateway>,
    pricing: Arc<PricingService>,
    locks: CartLocks,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        catalog: Arc<dyn CatalogGateway>,
        pricing: Arc<PricingService>,
        locks: CartLocks,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            catalog,
            pricing,
            locks,
            event_sender,
        }
    }

    /// Adds `quantity` of a product (or variant) to the caller's cart.
    ///
    /// An existing line for the same item is incremented, clamped to the
    /// available stock. A new line captures the current price.
    #[instrument(skip(self, actor), fields(owner = %actor.user_id))]
    pub async fn add_item(
        &self,
        actor: &Actor,
        input: AddItemInput,
    ) -> Result<CartView, ServiceError> {
        actor.require(Capability::ManageOwnCart)?;
        input.validate()?;

        let owner_id = actor.user_id;
        let _guard = self.locks.acquire(owner_id).await;

        let entry = self
            .catalog
            .lookup(input.product_id, input.variant_id)
            .await?
            .ok_or_else(|| not_found(input.product_id, input.variant_id))?;

        let cart = self.get_or_create_cart(owner_id).await?;
        let items = self.load_items(cart.id).await?;
        let existing = items
            .iter()
            .find(|item| item.same_line(input.product_id, input.variant_id));
        let now = Utc::now();

        let (write, is_new) = match existing {
            Some(line) => {
                if line.quantity >= entry.stock {
                    return Err(ServiceError::OutOfStock(format!(
                        "'{}' has only {} in stock and all of it is already in the cart",
                        entry.name, entry.stock
                    )));
                }
                let requested = line.quantity.saturating_add(input.quantity);
                let quantity = requested.min(entry.stock);
                if quantity < requested {
                    warn!(
                        item_id = %line.id,
                        requested,
                        granted = quantity,
                        "cart line clamped to available stock"
                    );
                }
                let mut active: cart_item::ActiveModel = line.clone().into();
                active.quantity = Set(quantity);
                active.updated_at = Set(now);
                (active, false)
            }
            None => {
                if input.quantity > entry.stock {
                    return Err(ServiceError::OutOfStock(format!(
                        "Requested {} of '{}' but only {} in stock",
                        input.quantity, entry.name, entry.stock
                    )));
                }
                let position = items.iter().map(|i| i.position).max().map_or(0, |p| p + 1);
                let line = cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(input.product_id),
                    variant_id: Set(input.variant_id),
                    quantity: Set(input.quantity),
                    price_at_addition: Set(entry.price),
                    position: Set(position),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                (line, true)
            }
        };

        let txn = self.db.begin().await?;
        if is_new {
            write.insert(&txn).await?;
        } else {
            write.update(&txn).await?;
        }
        bump_version(&txn, cart.id, now).await?;
        txn.commit().await?;

        info!(
            cart_id = %cart.id,
            product_id = %input.product_id,
            quantity = input.quantity,
            "item added to cart"
        );
        self.view_for(owner_id).await
    }

    /// Sets a line's quantity. Zero or less removes the line.
    #[instrument(skip(self, actor), fields(owner = %actor.user_id))]
    pub async fn set_quantity(
        &self,
        actor: &Actor,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<CartView, ServiceError> {
        actor.require(Capability::ManageOwnCart)?;
        if quantity <= 0 {
            return self.remove_item(actor, item_id).await;
        }

        let owner_id = actor.user_id;
        let _guard = self.locks.acquire(owner_id).await;

        let (cart, item) = self.find_owned_item(owner_id, item_id).await?;
        let entry = self
            .catalog
            .lookup(item.product_id, item.variant_id)
            .await?
            .ok_or_else(|| not_found(item.product_id, item.variant_id))?;
        if quantity > entry.stock {
            return Err(ServiceError::OutOfStock(format!(
                "Requested {} of '{}' but only {} in stock",
                quantity, entry.name, entry.stock
            )));
        }

        let now = Utc::now();
        let txn = self.db.begin().await?;
        let mut active: cart_item::ActiveModel = item.into();
        active.quantity = Set(quantity);
        active.updated_at = Set(now);
        active.update(&txn).await?;
        bump_version(&txn, cart.id, now).await?;
        txn.commit().await?;

        info!(cart_id = %cart.id, %item_id, quantity, "cart line quantity set");
        self.view_for(owner_id).await
    }

    #[instrument(skip(self, actor), fields(owner = %actor.user_id))]
    pub async fn remove_item(
        &self,
        actor: &Actor,
        item_id: Uuid,
    ) -> Result<CartView, ServiceError> {
        actor.require(Capability::ManageOwnCart)?;

        let owner_id = actor.user_id;
        let _guard = self.locks.acquire(owner_id).await;

        let (cart, _) = self.find_owned_item(owner_id, item_id).await?;

        let now = Utc::now();
        let txn = self.db.begin().await?;
        cart_item::Entity::delete_many()
            .filter(cart_item::Column::Id.eq(item_id))
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(&txn)
            .await?;
        bump_version(&txn, cart.id, now).await?;
        txn.commit().await?;

        info!(cart_id = %cart.id, %item_id, "item removed from cart");
        self.view_for(owner_id).await
    }

    #[instrument(skip(self, actor), fields(owner = %actor.user_id))]
    pub async fn clear(&self, actor: &Actor) -> Result<CartView, ServiceError> {
        actor.require(Capability::ManageOwnCart)?;

        let owner_id = actor.user_id;
        let _guard = self.locks.acquire(owner_id).await;

        if let Some(cart) = self.find_cart(owner_id).await? {
            let now = Utc::now();
            let txn = self.db.begin().await?;
            cart_item::Entity::delete_many()
                .filter(cart_item::Column::CartId.eq(cart.id))
                .exec(&txn)
                .await?;
            bump_version(&txn, cart.id, now).await?;
            txn.commit().await?;

            info!(cart_id = %cart.id, "cart cleared");
            self.event_sender
                .send_or_log(Event::CartCleared {
                    cart_id: cart.id,
                    owner_id,
                });
        }

        self.view_for(owner_id).await
    }

    /// Current cart contents at live catalog prices.
    pub async fn snapshot(&self, actor: &Actor) -> Result<CartView, ServiceError> {
        actor.require(Capability::ManageOwnCart)?;
        self.view_for(actor.user_id).await
    }

    /// Prices the caller's cart, optionally with a coupon, without
    /// committing anything.
    #[instrument(skip(self, actor), fields(owner = %actor.user_id))]
    pub async fn quote(
        &self,
        actor: &Actor,
        coupon_code: Option<&str>,
    ) -> Result<CartQuoteView, ServiceError> {
        actor.require(Capability::ManageOwnCart)?;

        let cart = self.find_cart(actor.user_id).await?;
        let items = match &cart {
            Some(cart) => self.load_items(cart.id).await?,
            None => Vec::new(),
        };
        let quote = self.pricing.quote(items, coupon_code, Utc::now()).await?;
        let cart = CartView::build(actor.user_id, cart.as_ref(), &quote.items);

        Ok(CartQuoteView {
            cart,
            pricing: quote.breakdown,
        })
    }

    pub async fn find_cart(&self, owner_id: Uuid) -> Result<Option<cart::Model>, ServiceError> {
        Ok(cart::Entity::find()
            .filter(cart::Column::OwnerId.eq(owner_id))
            .one(&*self.db)
            .await?)
    }

    /// Lines of a cart in insertion order.
    pub async fn load_items(&self, cart_id: Uuid) -> Result<Vec<cart_item::Model>, ServiceError> {
        Ok(cart_item::Entity::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .order_by_asc(cart_item::Column::Position)
            .all(&*self.db)
            .await?)
    }

    async fn get_or_create_cart(&self, owner_id: Uuid) -> Result<cart::Model, ServiceError> {
        if let Some(cart) = self.find_cart(owner_id).await? {
            return Ok(cart);
        }
        let now = Utc::now();
        let cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            owner_id: Set(owner_id),
            version: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;
        info!(cart_id = %cart.id, %owner_id, "cart created");
        Ok(cart)
    }

    async fn find_owned_item(
        &self,
        owner_id: Uuid,
        item_id: Uuid,
    ) -> Result<(cart::Model, cart_item::Model), ServiceError> {
        let missing = || ServiceError::NotFound(format!("Cart item {} not found", item_id));

        let cart = self.find_cart(owner_id).await?.ok_or_else(missing)?;
        let item = cart_item::Entity::find_by_id(item_id)
            .filter(cart_item::Column::CartId.eq(cart.id))
            .one(&*self.db)
            .await?
            .ok_or_else(missing)?;
        Ok((cart, item))
    }

    async fn view_for(&self, owner_id: Uuid) -> Result<CartView, ServiceError> {
        let Some(cart) = self.find_cart(owner_id).await? else {
            return Ok(CartView::build(owner_id, None, &[]));
        };
        let items = self.load_items(cart.id).await?;
        let repriced = self.pricing.reprice(items).await?;
        Ok(CartView::build(owner_id, Some(&cart), &repriced))
    }
}

/// Increments the cart version inside `conn`'s transaction.
pub(crate) async fn bump_version<C: ConnectionTrait>(
    conn: &C,
    cart_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    cart::Entity::update_many()
        .col_expr(cart::Column::Version, Expr::col(cart::Column::Version).add(1))
        .col_expr(cart::Column::UpdatedAt, Expr::value(now))
        .filter(cart::Column::Id.eq(cart_id))
        .exec(conn)
        .await?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub name: Option<String>,
    pub quantity: i32,
    #[serde(serialize_with = "serialize_cents")]
    pub price_at_addition: Cents,
    #[serde(serialize_with = "serialize_optional_cents")]
    pub current_price: Option<Cents>,
    #[serde(serialize_with = "serialize_cents")]
    pub line_total: Cents,
    pub price_changed: bool,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub cart_id: Option<Uuid>,
    pub owner_id: Uuid,
    pub version: i32,
    pub items: Vec<CartLine>,
    pub total_quantity: i64,
    #[serde(serialize_with = "serialize_cents")]
    pub total_price: Cents,
}

impl CartView {
    /// Unavailable lines are listed but left out of the totals.
    pub fn build(owner_id: Uuid, cart: Option<&cart::Model>, items: &[RepricedItem]) -> Self {
        let lines: Vec<CartLine> = items
            .iter()
            .map(|RepricedItem { item, entry }| {
                let current_price = entry.as_ref().map(|e| e.price);
                CartLine {
                    id: item.id,
                    product_id: item.product_id,
                    variant_id: item.variant_id,
                    name: entry.as_ref().map(|e| e.name.clone()),
                    quantity: item.quantity,
                    price_at_addition: item.price_at_addition,
                    current_price,
                    line_total: current_price.map_or(0, |p| line_total(p, item.quantity)),
                    price_changed: current_price.is_some_and(|p| p != item.price_at_addition),
                    available: entry.is_some(),
                }
            })
            .collect();

        let available = || lines.iter().filter(|l| l.available);
        Self {
            cart_id: cart.map(|c| c.id),
            owner_id,
            version: cart.map_or(0, |c| c.version),
            total_quantity: available().map(|l| i64::from(l.quantity)).sum(),
            total_price: available().fold(0, |acc: Cents, l| acc.saturating_add(l.line_total)),
            items: lines,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CartQuoteView {
    pub cart: CartView,
    pub pricing: DiscountBreakdown,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddItemInput {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}
