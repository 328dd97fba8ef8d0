//! Property-based tests for discount evaluation.
//!
//! Whatever mix of lines, promotions and coupon terms is thrown at the engine,
//! the total never goes negative or above the subtotal.

use chrono::{Duration, Utc};
use proptest::prelude::*;
use storefront_api::{
    entities::{
        coupon::{self, DiscountType},
        promotion::{self, PromotionTarget, PromotionType},
    },
    services::discounts::{CouponCandidate, DiscountEngine, PricedLine},
};
use uuid::Uuid;

const CATEGORY: Uuid = Uuid::from_u128(0xC0FFEE);

fn line_strategy() -> impl Strategy<Value = PricedLine> {
    (0i64..500_000, 1i32..50, any::<bool>()).prop_map(|(unit_price, quantity, in_category)| {
        PricedLine {
            product_id: Uuid::new_v4(),
            variant_id: None,
            category_id: in_category.then_some(CATEGORY),
            quantity,
            unit_price,
        }
    })
}

fn discount_type_strategy() -> impl Strategy<Value = DiscountType> {
    prop_oneof![Just(DiscountType::Percentage), Just(DiscountType::FixedAmount)]
}

fn promotion_type_strategy() -> impl Strategy<Value = PromotionType> {
    prop_oneof![
        Just(PromotionType::PercentageDiscount),
        Just(PromotionType::FixedAmountDiscount),
        Just(PromotionType::FreeShipping),
    ]
}

fn coupon_strategy() -> impl Strategy<Value = coupon::Model> {
    (
        discount_type_strategy(),
        0i64..2_000_000,
        0i64..100_000,
        proptest::option::of(1i64..1_000_000),
    )
        .prop_map(|(discount_type, value, min_purchase, cap)| {
            let now = Utc::now();
            let discount_value = match discount_type {
                DiscountType::Percentage => value % 10_001,
                DiscountType::FixedAmount => value,
            };
            coupon::Model {
                id: Uuid::new_v4(),
                code: "PROP".to_string(),
                discount_type,
                discount_value,
                min_purchase_amount: min_purchase,
                max_discount_amount: cap,
                usage_limit: None,
                times_used: 0,
                expires_at: None,
                is_active: true,
                created_at: now,
                updated_at: now,
            }
        })
}

fn promotion_strategy() -> impl Strategy<Value = promotion::Model> {
    (
        promotion_type_strategy(),
        any::<bool>(),
        0i64..2_000_000,
        proptest::option::of(1i64..1_000_000),
    )
        .prop_map(|(promotion_type, by_category, value, cap)| {
            let now = Utc::now();
            let (target_type, target_id) = if by_category {
                (PromotionTarget::Category, Some(CATEGORY))
            } else {
                (PromotionTarget::AllProducts, None)
            };
            let discount_value = match promotion_type {
                PromotionType::PercentageDiscount => value % 10_001,
                _ => value,
            };
            promotion::Model {
                id: Uuid::new_v4(),
                name: "prop".to_string(),
                description: None,
                promotion_type,
                target_type,
                target_id,
                discount_value,
                min_purchase_amount: 0,
                max_discount_amount: cap,
                start_date: now - Duration::days(1),
                end_date: now + Duration::days(1),
                is_active: true,
                created_at: now,
                updated_at: now,
            }
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn final_total_stays_within_zero_and_subtotal(
        lines in proptest::collection::vec(line_strategy(), 0..8),
        promotions in proptest::collection::vec(promotion_strategy(), 0..4),
        coupon in proptest::option::of(coupon_strategy()),
    ) {
        let breakdown = DiscountEngine.evaluate(
            &lines,
            coupon.as_ref().map(CouponCandidate::Known),
            &promotions,
            Utc::now(),
        );

        prop_assert!(breakdown.final_total >= 0);
        prop_assert!(breakdown.final_total <= breakdown.subtotal);
        prop_assert!(breakdown.promotion_discount >= 0);
        prop_assert!(breakdown.coupon_discount >= 0);
        prop_assert_eq!(
            breakdown.total_discount,
            breakdown.promotion_discount + breakdown.coupon_discount
        );
        prop_assert_eq!(breakdown.final_total, breakdown.subtotal - breakdown.total_discount);
    }

    #[test]
    fn rejected_coupons_contribute_nothing(
        lines in proptest::collection::vec(line_strategy(), 1..6),
        coupon in coupon_strategy(),
    ) {
        let mut coupon = coupon;
        coupon.is_active = false;

        let breakdown = DiscountEngine.evaluate(
            &lines,
            Some(CouponCandidate::Known(&coupon)),
            &[],
            Utc::now(),
        );

        prop_assert!(breakdown.coupon_rejection.is_some());
        prop_assert_eq!(breakdown.coupon_discount, 0);
        prop_assert_eq!(breakdown.final_total, breakdown.subtotal);
    }
}
