mod common;

use assert_matches::assert_matches;
use common::TestApp;
use storefront_api::{
    auth::Actor,
    entities::{
        coupon::DiscountType,
        order::{OrderStatus, PaymentMethod, PaymentStatus},
        promotion::PromotionType,
    },
    errors::ServiceError,
    services::{cart::AddItemInput, orders::PlaceOrderInput},
};
use uuid::Uuid;

fn checkout(coupon_code: Option<&str>) -> PlaceOrderInput {
    PlaceOrderInput {
        shipping_address: "1 Market St, Springfield".to_string(),
        payment_method: PaymentMethod::Card,
        coupon_code: coupon_code.map(str::to_string),
        strict_coupon: true,
        notes: None,
    }
}

async fn fill_cart(app: &TestApp, actor: &Actor, product_id: Uuid, quantity: i32) {
    app.state
        .services
        .cart
        .add_item(
            actor,
            AddItemInput {
                product_id,
                variant_id: None,
                quantity,
            },
        )
        .await
        .expect("add to cart");
}

#[tokio::test]
async fn percentage_coupon_over_minimum_is_applied_and_redeemed() {
    let app = TestApp::new().await;
    let shopper = app.customer().await;
    let product = app.create_product(1000, 10).await;
    let coupon = app.create_coupon("SAVE10", 1000, 2000, None).await;
    fill_cart(&app, &shopper, product.id, 3).await;

    let order = app
        .state
        .services
        .order
        .place_order(&shopper, checkout(Some("SAVE10")))
        .await
        .unwrap();

    assert_eq!(order.subtotal, 3000);
    assert_eq!(order.coupon_discount, 300);
    assert_eq!(order.discount_applied, 300);
    assert_eq!(order.total_amount, 2700);
    assert_eq!(order.coupon_id, Some(coupon.id));
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.items.len(), 1);
    assert!(order.order_number.starts_with("ORD-"));

    assert_eq!(app.coupon(coupon.id).await.times_used, 1);
    assert_eq!(app.product(product.id).await.stock, 7);
    let cart = app.state.services.cart.snapshot(&shopper).await.unwrap();
    assert!(cart.items.is_empty());
}

#[tokio::test]
async fn coupon_below_minimum_rejects_checkout_and_changes_nothing() {
    let app = TestApp::new().await;
    let shopper = app.customer().await;
    let product = app.create_product(500, 10).await;
    let coupon = app.create_coupon("SAVE10", 1000, 2000, None).await;
    fill_cart(&app, &shopper, product.id, 3).await;

    let result = app
        .state
        .services
        .order
        .place_order(&shopper, checkout(Some("SAVE10")))
        .await;
    assert_matches!(result, Err(ServiceError::InvalidCoupon(_)));

    assert_eq!(app.coupon(coupon.id).await.times_used, 0);
    assert_eq!(app.product(product.id).await.stock, 10);
    let quote = app
        .state
        .services
        .cart
        .quote(&shopper, Some("SAVE10"))
        .await
        .unwrap();
    assert_eq!(quote.pricing.final_total, 1500);
    assert_eq!(quote.cart.items.len(), 1);
}

#[tokio::test]
async fn lenient_checkout_drops_an_inapplicable_coupon() {
    let app = TestApp::new().await;
    let shopper = app.customer().await;
    let product = app.create_product(500, 10).await;
    let coupon = app.create_coupon("SAVE10", 1000, 2000, None).await;
    fill_cart(&app, &shopper, product.id, 3).await;

    let mut input = checkout(Some("SAVE10"));
    input.strict_coupon = false;
    let order = app
        .state
        .services
        .order
        .place_order(&shopper, input)
        .await
        .unwrap();

    assert_eq!(order.total_amount, 1500);
    assert_eq!(order.coupon_id, None);
    assert_eq!(app.coupon(coupon.id).await.times_used, 0);
}

#[tokio::test]
async fn insufficient_stock_rejects_the_whole_checkout() {
    let app = TestApp::new().await;
    let shopper = app.customer().await;
    let plenty = app.create_product(1000, 10).await;
    let scarce = app.create_product(1000, 2).await;
    fill_cart(&app, &shopper, plenty.id, 2).await;
    fill_cart(&app, &shopper, scarce.id, 2).await;

    // Someone else buys the last units after the cart was filled.
    let other = app.customer().await;
    fill_cart(&app, &other, scarce.id, 1).await;
    app.state
        .services
        .order
        .place_order(&other, checkout(None))
        .await
        .unwrap();

    let result = app
        .state
        .services
        .order
        .place_order(&shopper, checkout(None))
        .await;
    assert_matches!(result, Err(ServiceError::OutOfStock(_)));

    assert_eq!(app.product(plenty.id).await.stock, 10);
    assert_eq!(app.product(scarce.id).await.stock, 1);
    let cart = app.state.services.cart.snapshot(&shopper).await.unwrap();
    assert_eq!(cart.items.len(), 2);
}

#[tokio::test]
async fn empty_cart_cannot_be_checked_out() {
    let app = TestApp::new().await;
    let shopper = app.customer().await;

    let result = app
        .state
        .services
        .order
        .place_order(&shopper, checkout(None))
        .await;
    assert_matches!(result, Err(ServiceError::BadRequest(_)));
}

#[tokio::test]
async fn last_coupon_use_goes_to_exactly_one_concurrent_checkout() {
    let app = TestApp::new().await;
    let product = app.create_product(1000, 100).await;
    let coupon = app.create_coupon("LASTONE", 1000, 0, Some(1)).await;

    let alice = app.customer().await;
    let bob = app.customer().await;
    fill_cart(&app, &alice, product.id, 3).await;
    fill_cart(&app, &bob, product.id, 3).await;

    let orders = app.state.services.order.clone();
    let (a, b) = tokio::join!(
        orders.place_order(&alice, checkout(Some("LASTONE"))),
        orders.place_order(&bob, checkout(Some("LASTONE"))),
    );

    let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "alice: {:?}, bob: {:?}", a.as_ref().err(), b.as_ref().err());
    let failure = if a.is_err() { a } else { b };
    assert_matches!(failure, Err(ServiceError::InvalidCoupon(_)));

    assert_eq!(app.coupon(coupon.id).await.times_used, 1);
    assert_eq!(app.product(product.id).await.stock, 97);
}

#[tokio::test]
async fn concurrent_checkouts_never_oversell() {
    let app = TestApp::new().await;
    let product = app.create_product(1000, 3).await;

    let mut shoppers = Vec::new();
    for _ in 0..3 {
        let shopper = app.customer().await;
        fill_cart(&app, &shopper, product.id, 2).await;
        shoppers.push(shopper);
    }

    let orders = app.state.services.order.clone();
    let (first, second, third) = tokio::join!(
        orders.place_order(&shoppers[0], checkout(None)),
        orders.place_order(&shoppers[1], checkout(None)),
        orders.place_order(&shoppers[2], checkout(None)),
    );
    let results = [first, second, third];

    let placed = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(placed, 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert_matches!(result, Err(ServiceError::OutOfStock(_)));
    }
    assert_eq!(app.product(product.id).await.stock, 1);
}

#[tokio::test]
async fn promotion_and_coupon_stack_and_clamp_at_subtotal() {
    let app = TestApp::new().await;
    let shopper = app.customer().await;
    let product = app.create_product(1000, 10).await;
    app.create_promotion(PromotionType::FixedAmountDiscount, 2500).await;
    app.insert_coupon(
        "BIGFIX",
        DiscountType::FixedAmount,
        1000,
        0,
        None,
        None,
    )
    .await;
    fill_cart(&app, &shopper, product.id, 3).await;

    let order = app
        .state
        .services
        .order
        .place_order(&shopper, checkout(Some("BIGFIX")))
        .await
        .unwrap();

    assert_eq!(order.subtotal, 3000);
    assert_eq!(order.promotion_discount, 2500);
    assert_eq!(order.coupon_discount, 500);
    assert_eq!(order.total_amount, 0);
    assert!(order.promotion_id.is_some());
}

#[tokio::test]
async fn checkout_returns_when_event_consumer_is_stalled() {
    let app = TestApp::with_stalled_events().await;
    let shopper = app.customer().await;
    let product = app.create_product(1000, 10).await;
    let orders = app.state.services.order.clone();
    let limit = std::time::Duration::from_secs(3);

    for _ in 0..2 {
        fill_cart(&app, &shopper, product.id, 1).await;
        let placed = tokio::time::timeout(limit, orders.place_order(&shopper, checkout(None)))
            .await
            .expect("checkout blocked on event publishing");
        assert!(placed.is_ok());
    }

    let cleared = tokio::time::timeout(limit, app.state.services.cart.clear(&shopper))
        .await
        .expect("cart lock still held after checkout");
    assert!(cleared.unwrap().items.is_empty());
    assert_eq!(app.product(product.id).await.stock, 8);
}
