//! Discount evaluation.
//!
//! [`DiscountEngine::evaluate`] is a pure function of cart lines, an optional
//! coupon, the candidate promotions and the evaluation instant. At most one
//! promotion and one coupon apply; their sum never exceeds the subtotal.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use uuid::Uuid;

use crate::entities::coupon::{self, DiscountType};
use crate::entities::promotion::{self, PromotionTarget, PromotionType};
use crate::errors::ServiceError;
use crate::money::{apply_basis_points, line_total, serialize_cents, to_decimal, Cents};

/// A cart line priced at the current catalog price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price: Cents,
}

impl PricedLine {
    pub fn total(&self) -> Cents {
        line_total(self.unit_price, self.quantity)
    }
}

/// The coupon side of an evaluation: either a stored coupon or a code that
/// matched nothing.
#[derive(Debug, Clone, Copy)]
pub enum CouponCandidate<'a> {
    Unknown(&'a str),
    Known(&'a coupon::Model),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CouponRejection {
    NotFound,
    Inactive,
    Expired,
    UsageExhausted,
    BelowMinimum {
        #[serde(serialize_with = "serialize_cents")]
        required: Cents,
    },
}

impl fmt::Display for CouponRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CouponRejection::NotFound => f.write_str("coupon code not found"),
            CouponRejection::Inactive => f.write_str("coupon is not active"),
            CouponRejection::Expired => f.write_str("coupon has expired"),
            CouponRejection::UsageExhausted => f.write_str("coupon usage limit has been reached"),
            CouponRejection::BelowMinimum { required } => write!(
                f,
                "a minimum purchase of {} is required",
                to_decimal(*required)
            ),
        }
    }
}

impl std::error::Error for CouponRejection {}

impl From<CouponRejection> for ServiceError {
    fn from(rejection: CouponRejection) -> Self {
        ServiceError::InvalidCoupon(rejection.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedPromotion {
    pub id: Uuid,
    pub name: String,
    pub promotion_type: PromotionType,
    #[serde(serialize_with = "serialize_cents")]
    pub discount: Cents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedCoupon {
    pub id: Uuid,
    pub code: String,
    #[serde(serialize_with = "serialize_cents")]
    pub discount: Cents,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscountBreakdown {
    #[serde(serialize_with = "serialize_cents")]
    pub subtotal: Cents,
    #[serde(serialize_with = "serialize_cents")]
    pub promotion_discount: Cents,
    #[serde(serialize_with = "serialize_cents")]
    pub coupon_discount: Cents,
    #[serde(serialize_with = "serialize_cents")]
    pub total_discount: Cents,
    #[serde(serialize_with = "serialize_cents")]
    pub final_total: Cents,
    pub free_shipping: bool,
    pub applied_promotion: Option<AppliedPromotion>,
    pub applied_coupon: Option<AppliedCoupon>,
    pub coupon_rejection: Option<CouponRejection>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DiscountEngine;

impl DiscountEngine {
    pub fn evaluate(
        &self,
        lines: &[PricedLine],
        coupon: Option<CouponCandidate<'_>>,
        promotions: &[promotion::Model],
        now: DateTime<Utc>,
    ) -> DiscountBreakdown {
        let subtotal = lines
            .iter()
            .fold(0i64, |acc, line| acc.saturating_add(line.total()))
            .max(0);

        let best_promotion = promotions
            .iter()
            .filter_map(|promo| {
                promotion_discount(promo, lines, subtotal, now).map(|discount| (promo, discount))
            })
            .max_by(|(a, da), (b, db)| {
                da.cmp(db)
                    // Earlier start wins, so it must compare as greater.
                    .then_with(|| b.start_date.cmp(&a.start_date))
                    .then_with(|| b.id.cmp(&a.id))
            });

        let (applied_promotion, promotion_amount, free_shipping) = match best_promotion {
            Some((promo, discount)) => (
                Some(AppliedPromotion {
                    id: promo.id,
                    name: promo.name.clone(),
                    promotion_type: promo.promotion_type,
                    discount,
                }),
                discount,
                promo.promotion_type == PromotionType::FreeShipping,
            ),
            None => (None, 0, false),
        };

        let (coupon_outcome, coupon_rejection) = match coupon {
            None => (None, None),
            Some(candidate) => match coupon_discount(candidate, subtotal, now) {
                Ok(applied) => (Some(applied), None),
                Err(rejection) => (None, Some(rejection)),
            },
        };

        let coupon_amount = coupon_outcome.as_ref().map(|c| c.discount).unwrap_or(0);
        let total_discount = promotion_amount.saturating_add(coupon_amount).min(subtotal);
        // When the sum is clamped, the coupon absorbs the reduction.
        let coupon_amount = total_discount - promotion_amount;
        let applied_coupon = coupon_outcome.map(|mut c| {
            c.discount = coupon_amount;
            c
        });

        DiscountBreakdown {
            subtotal,
            promotion_discount: promotion_amount,
            coupon_discount: coupon_amount,
            total_discount,
            final_total: subtotal - total_discount,
            free_shipping,
            applied_promotion,
            applied_coupon,
            coupon_rejection,
        }
    }
}

/// Subtotal of the lines a promotion targets, or `None` when it targets none.
fn matching_subtotal(promo: &promotion::Model, lines: &[PricedLine]) -> Option<Cents> {
    let matches = |line: &PricedLine| match promo.target_type {
        PromotionTarget::AllProducts => true,
        PromotionTarget::Category => {
            promo.target_id.is_some() && line.category_id == promo.target_id
        }
        PromotionTarget::Product => promo.target_id == Some(line.product_id),
    };

    let mut any = false;
    let mut total: Cents = 0;
    for line in lines.iter().filter(|l| matches(*l)) {
        any = true;
        total = total.saturating_add(line.total());
    }
    any.then_some(total)
}

fn promotion_discount(
    promo: &promotion::Model,
    lines: &[PricedLine],
    subtotal: Cents,
    now: DateTime<Utc>,
) -> Option<Cents> {
    if !promo.is_active_at(now) || subtotal < promo.min_purchase_amount {
        return None;
    }
    let matching = matching_subtotal(promo, lines)?;

    let raw = match promo.promotion_type {
        PromotionType::PercentageDiscount => apply_basis_points(matching, promo.discount_value),
        PromotionType::FixedAmountDiscount => promo.discount_value,
        PromotionType::FreeShipping => 0,
    };
    let ceiling = promo
        .max_discount_amount
        .map_or(matching, |cap| cap.min(matching));
    Some(raw.clamp(0, ceiling.max(0)))
}

fn coupon_discount(
    candidate: CouponCandidate<'_>,
    subtotal: Cents,
    now: DateTime<Utc>,
) -> Result<AppliedCoupon, CouponRejection> {
    let coupon = match candidate {
        CouponCandidate::Unknown(_) => return Err(CouponRejection::NotFound),
        CouponCandidate::Known(coupon) => coupon,
    };

    if !coupon.is_active {
        return Err(CouponRejection::Inactive);
    }
    if coupon.is_expired_at(now) {
        return Err(CouponRejection::Expired);
    }
    if coupon.usage_exhausted() {
        return Err(CouponRejection::UsageExhausted);
    }
    if subtotal < coupon.min_purchase_amount {
        return Err(CouponRejection::BelowMinimum {
            required: coupon.min_purchase_amount,
        });
    }

    let discount = match coupon.discount_type {
        DiscountType::Percentage => {
            let amount = apply_basis_points(subtotal, coupon.discount_value);
            coupon
                .max_discount_amount
                .map_or(amount, |cap| amount.min(cap))
        }
        DiscountType::FixedAmount => coupon.discount_value,
    };

    Ok(AppliedCoupon {
        id: coupon.id,
        code: coupon.code.clone(),
        discount: discount.clamp(0, subtotal),
    })
}

/// Orders promotions the way the engine ranks equal discounts.
pub fn promotion_precedence(a: &promotion::Model, b: &promotion::Model) -> Ordering {
    a.start_date.cmp(&b.start_date).then_with(|| a.id.cmp(&b.id))
}
