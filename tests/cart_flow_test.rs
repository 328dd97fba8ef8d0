mod common;

use assert_matches::assert_matches;
use common::TestApp;
use storefront_api::{errors::ServiceError, services::cart::AddItemInput};
use uuid::Uuid;

fn add(product_id: Uuid, variant_id: Option<Uuid>, quantity: i32) -> AddItemInput {
    AddItemInput {
        product_id,
        variant_id,
        quantity,
    }
}

#[tokio::test]
async fn repeated_adds_merge_into_one_line() {
    let app = TestApp::new().await;
    let shopper = app.customer().await;
    let product = app.create_product(1000, 20).await;
    let carts = app.state.services.cart.clone();

    carts.add_item(&shopper, add(product.id, None, 2)).await.unwrap();
    let view = carts.add_item(&shopper, add(product.id, None, 3)).await.unwrap();

    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].quantity, 5);
    assert_eq!(view.total_quantity, 5);
    assert_eq!(view.total_price, 5000);
    assert_eq!(view.version, 2);
}

#[tokio::test]
async fn variants_of_one_product_are_separate_lines() {
    let app = TestApp::new().await;
    let shopper = app.customer().await;
    let product = app.create_product(2500, 0).await;
    let small = app.create_variant(product.id, 2400, 5).await;
    let large = app.create_variant(product.id, 2600, 5).await;
    let carts = app.state.services.cart.clone();

    carts.add_item(&shopper, add(product.id, Some(small.id), 1)).await.unwrap();
    let view = carts
        .add_item(&shopper, add(product.id, Some(large.id), 2))
        .await
        .unwrap();

    assert_eq!(view.items.len(), 2);
    assert_eq!(view.total_price, 2400 + 2 * 2600);
}

#[tokio::test]
async fn increment_is_clamped_to_stock() {
    let app = TestApp::new().await;
    let shopper = app.customer().await;
    let product = app.create_product(1000, 4).await;
    let carts = app.state.services.cart.clone();

    carts.add_item(&shopper, add(product.id, None, 3)).await.unwrap();
    let view = carts.add_item(&shopper, add(product.id, None, 5)).await.unwrap();
    assert_eq!(view.items[0].quantity, 4);

    let full = carts.add_item(&shopper, add(product.id, None, 1)).await;
    assert_matches!(full, Err(ServiceError::OutOfStock(_)));
}

#[tokio::test]
async fn new_line_beyond_stock_is_rejected() {
    let app = TestApp::new().await;
    let shopper = app.customer().await;
    let product = app.create_product(1000, 2).await;

    let result = app
        .state
        .services
        .cart
        .add_item(&shopper, add(product.id, None, 3))
        .await;
    assert_matches!(result, Err(ServiceError::OutOfStock(_)));

    let view = app.state.services.cart.snapshot(&shopper).await.unwrap();
    assert!(view.items.is_empty());
}

#[tokio::test]
async fn unknown_product_and_zero_quantity_are_rejected() {
    let app = TestApp::new().await;
    let shopper = app.customer().await;
    let product = app.create_product(1000, 2).await;
    let carts = app.state.services.cart.clone();

    assert_matches!(
        carts.add_item(&shopper, add(Uuid::new_v4(), None, 1)).await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        carts.add_item(&shopper, add(product.id, None, 0)).await,
        Err(ServiceError::BadRequest(_))
    );
}

#[tokio::test]
async fn setting_quantity_to_zero_removes_the_line() {
    let app = TestApp::new().await;
    let shopper = app.customer().await;
    let mug = app.create_product(1000, 10).await;
    let tee = app.create_product(2000, 10).await;
    let carts = app.state.services.cart.clone();

    carts.add_item(&shopper, add(mug.id, None, 1)).await.unwrap();
    let view = carts.add_item(&shopper, add(tee.id, None, 1)).await.unwrap();
    let mug_line = view.items.iter().find(|l| l.product_id == mug.id).unwrap().id;
    let tee_line = view.items.iter().find(|l| l.product_id == tee.id).unwrap().id;

    let view = carts.set_quantity(&shopper, tee_line, 3).await.unwrap();
    assert_eq!(view.total_price, 1000 + 3 * 2000);

    let view = carts.set_quantity(&shopper, mug_line, 0).await.unwrap();
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].product_id, tee.id);

    assert_matches!(
        carts.set_quantity(&shopper, tee_line, 11).await,
        Err(ServiceError::OutOfStock(_))
    );
}

#[tokio::test]
async fn carts_are_isolated_per_owner() {
    let app = TestApp::new().await;
    let alice = app.customer().await;
    let bob = app.customer().await;
    let product = app.create_product(1000, 10).await;
    let carts = app.state.services.cart.clone();

    let view = carts.add_item(&alice, add(product.id, None, 1)).await.unwrap();
    let alice_line = view.items[0].id;

    assert!(carts.snapshot(&bob).await.unwrap().items.is_empty());
    assert_matches!(
        carts.remove_item(&bob, alice_line).await,
        Err(ServiceError::NotFound(_))
    );
    assert_eq!(carts.snapshot(&alice).await.unwrap().items.len(), 1);
}

#[tokio::test]
async fn live_price_is_used_and_changes_are_flagged() {
    let app = TestApp::new().await;
    let shopper = app.customer().await;
    let product = app.create_product(1000, 10).await;
    let carts = app.state.services.cart.clone();

    carts.add_item(&shopper, add(product.id, None, 2)).await.unwrap();
    app.set_product_price(product.id, 1200).await;

    let view = carts.snapshot(&shopper).await.unwrap();
    let line = &view.items[0];
    assert_eq!(line.price_at_addition, 1000);
    assert_eq!(line.current_price, Some(1200));
    assert!(line.price_changed);
    assert_eq!(view.total_price, 2400);
}

#[tokio::test]
async fn clear_empties_the_cart() {
    let app = TestApp::new().await;
    let shopper = app.customer().await;
    let product = app.create_product(1000, 10).await;
    let carts = app.state.services.cart.clone();

    carts.add_item(&shopper, add(product.id, None, 2)).await.unwrap();
    let view = carts.clear(&shopper).await.unwrap();

    assert!(view.items.is_empty());
    assert_eq!(view.total_price, 0);
    assert!(view.cart_id.is_some());
}

#[tokio::test]
async fn quote_previews_coupon_without_redeeming() {
    let app = TestApp::new().await;
    let shopper = app.customer().await;
    let product = app.create_product(1000, 10).await;
    let coupon = app.create_coupon("SAVE10", 1000, 2000, Some(5)).await;
    let carts = app.state.services.cart.clone();

    carts.add_item(&shopper, add(product.id, None, 3)).await.unwrap();
    let quote = carts.quote(&shopper, Some("save10")).await.unwrap();

    assert_eq!(quote.pricing.subtotal, 3000);
    assert_eq!(quote.pricing.coupon_discount, 300);
    assert_eq!(quote.pricing.final_total, 2700);
    assert_eq!(app.coupon(coupon.id).await.times_used, 0);

    let rejected = carts.quote(&shopper, Some("NOPE")).await.unwrap();
    assert!(rejected.pricing.coupon_rejection.is_some());
    assert_eq!(rejected.pricing.final_total, 3000);
}
