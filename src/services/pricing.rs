use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::entities::cart_item;
use crate::errors::ServiceError;
use crate::services::catalog::{CatalogEntry, CatalogGateway, ItemKey};
use crate::services::coupons::CouponService;
use crate::services::discounts::{CouponCandidate, DiscountBreakdown, DiscountEngine, PricedLine};
use crate::services::promotions::PromotionService;

/// A stored cart line joined with its live catalog entry. `entry` is `None`
/// when the product or variant is gone or inactive.
#[derive(Debug, Clone)]
pub struct RepricedItem {
    pub item: cart_item::Model,
    pub entry: Option<CatalogEntry>,
}

impl RepricedItem {
    pub fn priced_line(&self) -> Option<PricedLine> {
        self.entry.as_ref().map(|entry| PricedLine {
            product_id: self.item.product_id,
            variant_id: self.item.variant_id,
            category_id: entry.category_id,
            quantity: self.item.quantity,
            unit_price: entry.price,
        })
    }
}

/// Result of pricing a cart: lines at live prices plus the discount outcome.
#[derive(Debug, Clone)]
pub struct CartQuote {
    pub items: Vec<RepricedItem>,
    pub breakdown: DiscountBreakdown,
}

/// Shared repricing used by the cart quote endpoint and by checkout.
///
/// Every lookup here runs on the pooled connection, so callers must price
/// before opening a transaction.
#[derive(Clone)]
pub struct PricingService {
    catalog: Arc<dyn CatalogGateway>,
    coupons: Arc<CouponService>,
    promotions: Arc<PromotionService>,
    engine: DiscountEngine,
}

impl PricingService {
    pub fn new(
        catalog: Arc<dyn CatalogGateway>,
        coupons: Arc<CouponService>,
        promotions: Arc<PromotionService>,
    ) -> Self {
        Self {
            catalog,
            coupons,
            promotions,
            engine: DiscountEngine,
        }
    }

    pub async fn reprice(
        &self,
        items: Vec<cart_item::Model>,
    ) -> Result<Vec<RepricedItem>, ServiceError> {
        let keys: Vec<ItemKey> = items
            .iter()
            .map(|item| (item.product_id, item.variant_id))
            .collect();
        let entries = self.catalog.lookup_many(&keys).await?;

        Ok(items
            .into_iter()
            .map(|item| {
                let entry = entries.get(&(item.product_id, item.variant_id)).cloned();
                RepricedItem { item, entry }
            })
            .collect())
    }

    #[instrument(skip(self, items), fields(lines = items.len()))]
    pub async fn quote(
        &self,
        items: Vec<cart_item::Model>,
        coupon_code: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<CartQuote, ServiceError> {
        let items = self.reprice(items).await?;
        let lines: Vec<PricedLine> = items.iter().filter_map(RepricedItem::priced_line).collect();

        let code = coupon_code.map(str::trim).filter(|c| !c.is_empty());
        let coupon = match code {
            Some(code) => self.coupons.find_by_code(code).await?,
            None => None,
        };
        let candidate = match (code, coupon.as_ref()) {
            (_, Some(found)) => Some(CouponCandidate::Known(found)),
            (Some(code), None) => Some(CouponCandidate::Unknown(code)),
            (None, None) => None,
        };

        let promotions = if lines.is_empty() {
            Vec::new()
        } else {
            self.promotions.active_at(now).await?
        };

        let breakdown = self.engine.evaluate(&lines, candidate, &promotions, now);
        debug!(
            subtotal = breakdown.subtotal,
            final_total = breakdown.final_total,
            promotion = ?breakdown.applied_promotion.as_ref().map(|p| p.id),
            coupon_rejected = breakdown.coupon_rejection.is_some(),
            "cart priced"
        );

        Ok(CartQuote { items, breakdown })
    }
}
