use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Select, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{Actor, Capability};
use crate::entities::order::{
    self, Entity as OrderEntity, Model as OrderModel, OrderStatus, PaymentMethod, PaymentStatus,
};
use crate::entities::order_item::{self, Entity as OrderItemEntity, Model as OrderItemModel};
use crate::entities::{cart, cart_item};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::money::{line_total, serialize_cents, Cents};
use crate::services::cart::{bump_version, CartLocks, CartService};
use crate::services::catalog::{not_found, CatalogGateway};
use crate::services::coupons::CouponService;
use crate::services::order_status::validate_transition;
use crate::services::pricing::{CartQuote, PricingService};

/// Checkout and the order lifecycle.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    catalog: Arc<dyn CatalogGateway>,
    pricing: Arc<PricingService>,
    carts: Arc<CartService>,
    coupons: Arc<CouponService>,
    locks: CartLocks,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        catalog: Arc<dyn CatalogGateway>,
        pricing: Arc<PricingService>,
        carts: Arc<CartService>,
        coupons: Arc<CouponService>,
        locks: CartLocks,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            catalog,
            pricing,
            carts,
            coupons,
            locks,
            event_sender,
        }
    }

    /// Converts the caller's cart into an order.
    ///
    /// Pricing and stock checks run against fresh catalog data before the
    /// transaction opens; the transaction then re-checks stock and coupon
    /// usage with conditional updates, so either everything commits or
    /// nothing does.
    #[instrument(skip(self, actor, input), fields(owner = %actor.user_id))]
    pub async fn place_order(
        &self,
        actor: &Actor,
        input: PlaceOrderInput,
    ) -> Result<OrderResponse, ServiceError> {
        actor.require(Capability::PlaceOrders)?;
        input.validate()?;

        let owner_id = actor.user_id;
        let _guard = self.locks.acquire(owner_id).await;

        let cart = self
            .carts
            .find_cart(owner_id)
            .await?
            .ok_or_else(|| ServiceError::BadRequest("Cart is empty".to_string()))?;
        let items = self.carts.load_items(cart.id).await?;
        if items.is_empty() {
            return Err(ServiceError::BadRequest("Cart is empty".to_string()));
        }

        let now = Utc::now();
        let quote = self
            .pricing
            .quote(items, input.coupon_code.as_deref(), now)
            .await?;
        ensure_purchasable(&quote)?;

        if let Some(rejection) = &quote.breakdown.coupon_rejection {
            if input.strict_coupon {
                counter!("storefront_checkout_rejected_total", 1, "reason" => "invalid_coupon");
                warn!(%rejection, "checkout rejected: coupon not applicable");
                return Err(rejection.clone().into());
            }
            warn!(%rejection, "coupon ignored at checkout");
        }

        let txn = self.db.begin().await?;
        let written = match self
            .write_order(&txn, owner_id, &cart, &quote, &input, now)
            .await
        {
            Ok(written) => written,
            Err(err) => {
                if let Err(rollback_err) = txn.rollback().await {
                    error!(error = %rollback_err, "failed to roll back checkout transaction");
                }
                counter!("storefront_checkout_rejected_total", 1, "reason" => err.code());
                return Err(err);
            }
        };
        txn.commit().await?;

        let (order, order_items) = written;
        counter!("storefront_orders_placed_total", 1);
        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = order.total_amount,
            "order placed"
        );

        self.event_sender
            .send_or_log(Event::OrderPlaced {
                order_id: order.id,
                order_number: order.order_number.clone(),
                owner_id,
                total_amount: order.total_amount,
                coupon_id: order.coupon_id,
                placed_at: order.order_date,
            });
        self.event_sender
            .send_or_log(Event::CartCleared {
                cart_id: cart.id,
                owner_id,
            });

        Ok(OrderResponse::from_parts(order, order_items))
    }

    async fn write_order(
        &self,
        txn: &DatabaseTransaction,
        owner_id: Uuid,
        cart: &cart::Model,
        quote: &CartQuote,
        input: &PlaceOrderInput,
        now: DateTime<Utc>,
    ) -> Result<(OrderModel, Vec<OrderItemModel>), ServiceError> {
        let breakdown = &quote.breakdown;
        let order_id = Uuid::new_v4();

        let order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number(order_id, now)),
            owner_id: Set(owner_id),
            subtotal: Set(breakdown.subtotal),
            promotion_discount: Set(breakdown.promotion_discount),
            coupon_discount: Set(breakdown.coupon_discount),
            discount_applied: Set(breakdown.total_discount),
            total_amount: Set(breakdown.final_total),
            coupon_id: Set(breakdown.applied_coupon.as_ref().map(|c| c.id)),
            promotion_id: Set(breakdown.applied_promotion.as_ref().map(|p| p.id)),
            free_shipping: Set(breakdown.free_shipping),
            shipping_address: Set(input.shipping_address.trim().to_string()),
            payment_method: Set(input.payment_method),
            payment_status: Set(PaymentStatus::Pending),
            status: Set(OrderStatus::Pending),
            notes: Set(input.notes.clone()),
            order_date: Set(now),
            updated_at: Set(now),
            version: Set(1),
        }
        .insert(txn)
        .await?;

        let mut order_items = Vec::with_capacity(quote.items.len());
        for repriced in &quote.items {
            let Some(entry) = repriced.entry.as_ref() else {
                continue;
            };
            let item = &repriced.item;

            self.catalog
                .decrement_stock(txn, item.product_id, item.variant_id, item.quantity)
                .await?;

            let order_item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                variant_id: Set(item.variant_id),
                name: Set(entry.name.clone()),
                quantity: Set(item.quantity),
                unit_price: Set(entry.price),
                line_total: Set(line_total(entry.price, item.quantity)),
            }
            .insert(txn)
            .await?;
            order_items.push(order_item);
        }

        if let Some(applied) = &breakdown.applied_coupon {
            self.coupons.redeem(txn, applied.id, now).await?;
        }

        cart_item::Entity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .exec(txn)
            .await?;
        bump_version(txn, cart.id, now).await?;

        Ok((order, order_items))
    }

    /// Moves an order along the status table.
    ///
    /// Admins may request any allowed transition; owners may only cancel.
    #[instrument(skip(self, actor), fields(actor = %actor.user_id))]
    pub async fn update_status(
        &self,
        actor: &Actor,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderResponse, ServiceError> {
        let order = self.find_order(order_id).await?;

        let is_admin = actor.can(Capability::ManageOrders);
        let owner_cancelling = order.owner_id == actor.user_id
            && new_status == OrderStatus::Cancelled
            && actor.can(Capability::ViewOwnOrders);
        if !is_admin && !owner_cancelling {
            warn!(%order_id, %new_status, "status change not permitted");
            return Err(ServiceError::Forbidden(
                "Not allowed to change the status of this order".to_string(),
            ));
        }
        validate_transition(order.status, new_status)?;

        let items = self.find_items(order_id).await?;
        let now = Utc::now();

        let txn = self.db.begin().await?;
        if let Err(err) = self
            .apply_transition(&txn, &order, &items, new_status, now)
            .await
        {
            if let Err(rollback_err) = txn.rollback().await {
                error!(error = %rollback_err, "failed to roll back status transition");
            }
            return Err(self.explain_lost_transition(err, order_id, new_status).await);
        }
        txn.commit().await?;

        info!(%order_id, from = %order.status, to = %new_status, "order status changed");
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                owner_id: order.owner_id,
                old_status: order.status,
                new_status,
            });

        let updated = self.find_order(order_id).await?;
        Ok(OrderResponse::from_parts(updated, items))
    }

    /// Compare-and-set on the previous status plus the transition's side
    /// effects: restock on cancel, payment refund on refund.
    async fn apply_transition(
        &self,
        txn: &DatabaseTransaction,
        order: &OrderModel,
        items: &[OrderItemModel],
        new_status: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let mut update = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(new_status))
            .col_expr(order::Column::UpdatedAt, Expr::value(now))
            .col_expr(order::Column::Version, Expr::col(order::Column::Version).add(1));
        if new_status == OrderStatus::Refunded {
            update = update.col_expr(
                order::Column::PaymentStatus,
                Expr::value(PaymentStatus::Refunded),
            );
        }

        let result = update
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::Status.eq(order.status))
            .exec(txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::InvalidStatusTransition {
                from: order.status,
                to: new_status,
            });
        }

        if new_status == OrderStatus::Cancelled {
            for item in items {
                self.catalog
                    .restock(txn, item.product_id, item.variant_id, item.quantity)
                    .await?;
            }
            info!(order_id = %order.id, lines = items.len(), "cancelled order restocked");
        }
        Ok(())
    }

    /// A compare-and-set miss means another request moved the order first;
    /// report the transition from the status it holds now.
    async fn explain_lost_transition(
        &self,
        err: ServiceError,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> ServiceError {
        if !matches!(err, ServiceError::InvalidStatusTransition { .. }) {
            return err;
        }
        match self.find_order(order_id).await {
            Ok(current) => ServiceError::InvalidStatusTransition {
                from: current.status,
                to: new_status,
            },
            Err(lookup_err) => lookup_err,
        }
    }

    /// Admin correction of an order's mutable fields. A `status` in the patch
    /// goes through the same transition rules as [`Self::update_status`].
    #[instrument(skip(self, actor, patch), fields(actor = %actor.user_id))]
    pub async fn update_order(
        &self,
        actor: &Actor,
        order_id: Uuid,
        patch: UpdateOrderInput,
    ) -> Result<OrderResponse, ServiceError> {
        actor.require(Capability::ManageOrders)?;
        patch.validate()?;
        if patch.is_empty() {
            return Err(ServiceError::BadRequest("No fields to update".to_string()));
        }

        let order = self.find_order(order_id).await?;
        if let Some(new_status) = patch.status {
            validate_transition(order.status, new_status)?;
        }
        let items = self.find_items(order_id).await?;
        let now = Utc::now();

        let mut fields = <order::ActiveModel as Default>::default();
        if let Some(address) = &patch.shipping_address {
            fields.shipping_address = Set(address.trim().to_string());
        }
        if let Some(method) = patch.payment_method {
            fields.payment_method = Set(method);
        }
        if let Some(payment_status) = patch.payment_status {
            fields.payment_status = Set(payment_status);
        }
        if let Some(notes) = &patch.notes {
            fields.notes = Set(Some(notes.clone()));
        }
        fields.updated_at = Set(now);

        let txn = self.db.begin().await?;
        let outcome = async {
            OrderEntity::update_many()
                .set(fields)
                .filter(order::Column::Id.eq(order_id))
                .exec(&txn)
                .await?;
            if let Some(new_status) = patch.status {
                self.apply_transition(&txn, &order, &items, new_status, now)
                    .await?;
            }
            Ok::<_, ServiceError>(())
        }
        .await;

        if let Err(err) = outcome {
            if let Err(rollback_err) = txn.rollback().await {
                error!(error = %rollback_err, "failed to roll back order update");
            }
            return Err(match patch.status {
                Some(new_status) => self.explain_lost_transition(err, order_id, new_status).await,
                None => err,
            });
        }
        txn.commit().await?;

        info!(%order_id, "order updated");
        self.event_sender
            .send_or_log(Event::OrderUpdated { order_id });
        if let Some(new_status) = patch.status {
            self.event_sender
                .send_or_log(Event::OrderStatusChanged {
                    order_id,
                    owner_id: order.owner_id,
                    old_status: order.status,
                    new_status,
                });
        }

        let updated = self.find_order(order_id).await?;
        Ok(OrderResponse::from_parts(updated, items))
    }

    /// Visible to the order's owner and to order managers.
    pub async fn get_order(
        &self,
        actor: &Actor,
        order_id: Uuid,
    ) -> Result<OrderResponse, ServiceError> {
        let order = self.find_order(order_id).await?;
        let is_owner = order.owner_id == actor.user_id && actor.can(Capability::ViewOwnOrders);
        if !is_owner && !actor.can(Capability::ManageOrders) {
            return Err(ServiceError::Forbidden(
                "Not allowed to view this order".to_string(),
            ));
        }
        let items = self.find_items(order_id).await?;
        Ok(OrderResponse::from_parts(order, items))
    }

    pub async fn list_orders(
        &self,
        actor: &Actor,
        filter: OrderFilter,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        actor.require(Capability::ManageOrders)?;

        let mut query = OrderEntity::find();
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status));
        }
        if let Some(owner_id) = filter.owner_id {
            query = query.filter(order::Column::OwnerId.eq(owner_id));
        }
        self.paginate(query, page, per_page).await
    }

    pub async fn list_my_orders(
        &self,
        actor: &Actor,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        actor.require(Capability::ViewOwnOrders)?;

        let query = OrderEntity::find().filter(order::Column::OwnerId.eq(actor.user_id));
        self.paginate(query, page, per_page).await
    }

    /// Hard delete. Stock is not returned.
    #[instrument(skip(self, actor), fields(actor = %actor.user_id))]
    pub async fn delete_order(&self, actor: &Actor, order_id: Uuid) -> Result<(), ServiceError> {
        actor.require(Capability::ManageOrders)?;

        let txn = self.db.begin().await?;
        OrderItemEntity::delete_many()
            .filter(order_item::Column::OrderId.eq(order_id))
            .exec(&txn)
            .await?;
        let result = OrderEntity::delete_by_id(order_id).exec(&txn).await?;
        if result.rows_affected == 0 {
            txn.rollback().await?;
            return Err(ServiceError::NotFound(format!("Order {} not found", order_id)));
        }
        txn.commit().await?;

        info!(%order_id, "order deleted");
        self.event_sender
            .send_or_log(Event::OrderDeleted { order_id });
        Ok(())
    }

    async fn paginate(
        &self,
        query: Select<OrderEntity>,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let paginator = query
            .order_by_desc(order::Column::OrderDate)
            .paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let mut items_by_order: HashMap<Uuid, Vec<OrderItemModel>> = HashMap::new();
        if !ids.is_empty() {
            for item in OrderItemEntity::find()
                .filter(order_item::Column::OrderId.is_in(ids))
                .all(&*self.db)
                .await?
            {
                items_by_order.entry(item.order_id).or_default().push(item);
            }
        }

        let orders = orders
            .into_iter()
            .map(|order| {
                let items = items_by_order.remove(&order.id).unwrap_or_default();
                OrderResponse::from_parts(order, items)
            })
            .collect();

        Ok(OrderListResponse {
            orders,
            total,
            page,
            per_page,
        })
    }

    async fn find_order(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    async fn find_items(&self, order_id: Uuid) -> Result<Vec<OrderItemModel>, ServiceError> {
        Ok(OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?)
    }
}

/// Every line must still exist and be in stock; the first failure aborts
/// the checkout.
fn ensure_purchasable(quote: &CartQuote) -> Result<(), ServiceError> {
    for repriced in &quote.items {
        let item = &repriced.item;
        let Some(entry) = repriced.entry.as_ref() else {
            return Err(not_found(item.product_id, item.variant_id));
        };
        if entry.stock < item.quantity {
            return Err(ServiceError::OutOfStock(format!(
                "Only {} of '{}' in stock, {} requested",
                entry.stock, entry.name, item.quantity
            )));
        }
    }
    Ok(())
}

/// `ORD-20240131-1A2B3C4D`: placement date plus the leading id digits.
fn order_number(order_id: Uuid, now: DateTime<Utc>) -> String {
    let simple = order_id.simple().to_string().to_uppercase();
    format!("ORD-{}-{}", now.format("%Y%m%d"), &simple[..8])
}

fn default_strict_coupon() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PlaceOrderInput {
    #[validate(length(min = 1, max = 500, message = "Shipping address is required"))]
    pub shipping_address: String,
    pub payment_method: PaymentMethod,
    pub coupon_code: Option<String>,
    /// When false, an inapplicable coupon is dropped instead of failing.
    #[serde(default = "default_strict_coupon")]
    pub strict_coupon: bool,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateOrderInput {
    #[validate(length(min = 1, max = 500))]
    pub shipping_address: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub payment_status: Option<PaymentStatus>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    pub status: Option<OrderStatus>,
}

impl UpdateOrderInput {
    pub fn is_empty(&self) -> bool {
        self.shipping_address.is_none()
            && self.payment_method.is_none()
            && self.payment_status.is_none()
            && self.notes.is_none()
            && self.status.is_none()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub owner_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub name: String,
    pub quantity: i32,
    #[serde(serialize_with = "serialize_cents")]
    pub unit_price: Cents,
    #[serde(serialize_with = "serialize_cents")]
    pub line_total: Cents,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub owner_id: Uuid,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    #[serde(serialize_with = "serialize_cents")]
    pub subtotal: Cents,
    #[serde(serialize_with = "serialize_cents")]
    pub promotion_discount: Cents,
    #[serde(serialize_with = "serialize_cents")]
    pub coupon_discount: Cents,
    #[serde(serialize_with = "serialize_cents")]
    pub discount_applied: Cents,
    #[serde(serialize_with = "serialize_cents")]
    pub total_amount: Cents,
    pub coupon_id: Option<Uuid>,
    pub promotion_id: Option<Uuid>,
    pub free_shipping: bool,
    pub shipping_address: String,
    pub notes: Option<String>,
    pub order_date: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
    pub items: Vec<OrderItemResponse>,
}

impl OrderResponse {
    pub fn from_parts(order: OrderModel, items: Vec<OrderItemModel>) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number,
            owner_id: order.owner_id,
            status: order.status,
            payment_method: order.payment_method,
            payment_status: order.payment_status,
            subtotal: order.subtotal,
            promotion_discount: order.promotion_discount,
            coupon_discount: order.coupon_discount,
            discount_applied: order.discount_applied,
            total_amount: order.total_amount,
            coupon_id: order.coupon_id,
            promotion_id: order.promotion_id,
            free_shipping: order.free_shipping,
            shipping_address: order.shipping_address,
            notes: order.notes,
            order_date: order.order_date,
            updated_at: order.updated_at,
            version: order.version,
            items: items
                .into_iter()
                .map(|item| OrderItemResponse {
                    id: item.id,
                    product_id: item.product_id,
                    variant_id: item.variant_id,
                    name: item.name,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    line_total: item.line_total,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}
