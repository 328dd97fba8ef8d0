mod common;

use axum::http::{Method, StatusCode};
use common::{json_body, TestApp};
use serde_json::json;

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::new().await;

    let live = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(live.status(), StatusCode::OK);

    let ready = app.request(Method::GET, "/api/v1/health/ready", None, None).await;
    assert_eq!(ready.status(), StatusCode::OK);
    let body = json_body(ready).await;
    assert_eq!(body["database"]["status"], "up");
}

#[tokio::test]
async fn cart_requires_a_bearer_token() {
    let app = TestApp::new().await;

    let response = app.request(Method::GET, "/api/v1/cart", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key("x-request-id"));

    let body = json_body(response).await;
    assert_eq!(body["status"], "fail");
    assert_eq!(body["code"], "unauthorized");
    assert!(body["request_id"].is_string());

    let garbage = app
        .request(Method::GET, "/api/v1/cart", None, Some("not-a-jwt"))
        .await;
    assert_eq!(garbage.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn cart_to_order_over_http() {
    let app = TestApp::new().await;
    let shopper = app.customer().await;
    let token = app.token_for(&shopper);
    let product = app.create_product(1000, 10).await;
    app.create_coupon("SAVE10", 1000, 2000, Some(10)).await;

    let added = app
        .request(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({ "product_id": product.id, "quantity": 3 })),
            Some(&token),
        )
        .await;
    assert_eq!(added.status(), StatusCode::OK);
    let body = json_body(added).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["total_price"], "30.00");

    let quote = app
        .request(
            Method::POST,
            "/api/v1/cart/quote",
            Some(json!({ "coupon_code": "save10" })),
            Some(&token),
        )
        .await;
    assert_eq!(quote.status(), StatusCode::OK);
    let body = json_body(quote).await;
    assert_eq!(body["data"]["pricing"]["final_total"], "27.00");

    let placed = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "shipping_address": "1 Market St",
                "payment_method": "card",
                "coupon_code": "SAVE10"
            })),
            Some(&token),
        )
        .await;
    assert_eq!(placed.status(), StatusCode::CREATED);
    let body = json_body(placed).await;
    assert_eq!(body["data"]["total_amount"], "27.00");
    assert_eq!(body["data"]["status"], "pending");
    let order_id = body["data"]["id"].as_str().unwrap().to_string();

    let mine = app
        .request(Method::GET, "/api/v1/orders/mine", None, Some(&token))
        .await;
    assert_eq!(mine.status(), StatusCode::OK);
    let body = json_body(mine).await;
    assert_eq!(body["data"]["total"], 1);

    let cancelled = app
        .request(
            Method::PATCH,
            &format!("/api/v1/orders/{}/status", order_id),
            Some(json!({ "status": "cancelled" })),
            Some(&token),
        )
        .await;
    assert_eq!(cancelled.status(), StatusCode::OK);

    let again = app
        .request(
            Method::PATCH,
            &format!("/api/v1/orders/{}/status", order_id),
            Some(json!({ "status": "cancelled" })),
            Some(&token),
        )
        .await;
    assert_eq!(again.status(), StatusCode::CONFLICT);
    let body = json_body(again).await;
    assert_eq!(body["code"], "invalid_status_transition");
}

#[tokio::test]
async fn invalid_bodies_are_bad_requests() {
    let app = TestApp::new().await;
    let shopper = app.customer().await;
    let token = app.token_for(&shopper);
    let product = app.create_product(1000, 10).await;

    let zero = app
        .request(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({ "product_id": product.id, "quantity": 0 })),
            Some(&token),
        )
        .await;
    assert_eq!(zero.status(), StatusCode::BAD_REQUEST);

    let missing = app
        .request(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({ "quantity": 1 })),
            Some(&token),
        )
        .await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    let body = json_body(missing).await;
    assert_eq!(body["code"], "bad_request");
}

#[tokio::test]
async fn coupon_admin_routes_are_gated() {
    let app = TestApp::new().await;
    let shopper = app.customer().await;
    let admin = app.admin().await;
    let payload = json!({
        "code": "spring15",
        "discount_type": "percentage",
        "discount_value": "15",
        "min_purchase_amount": "10.00"
    });

    let denied = app
        .request(
            Method::POST,
            "/api/v1/coupons",
            Some(payload.clone()),
            Some(&app.token_for(&shopper)),
        )
        .await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let admin_token = app.token_for(&admin);
    let created = app
        .request(Method::POST, "/api/v1/coupons", Some(payload), Some(&admin_token))
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let body = json_body(created).await;
    assert_eq!(body["data"]["code"], "SPRING15");
    assert_eq!(body["data"]["discount_value"], "15.00");
    let coupon_id = body["data"]["id"].as_str().unwrap().to_string();

    let patched = app
        .request(
            Method::PATCH,
            &format!("/api/v1/coupons/{}", coupon_id),
            Some(json!({ "usage_limit": 3 })),
            Some(&admin_token),
        )
        .await;
    assert_eq!(patched.status(), StatusCode::OK);
    let body = json_body(patched).await;
    assert_eq!(body["data"]["usage_limit"], 3);

    let listed = app
        .request(Method::GET, "/api/v1/coupons", None, Some(&admin_token))
        .await;
    let body = json_body(listed).await;
    assert_eq!(body["data"]["total"], 1);

    let deleted = app
        .request(
            Method::DELETE,
            &format!("/api/v1/coupons/{}", coupon_id),
            None,
            Some(&admin_token),
        )
        .await;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn active_promotions_are_public() {
    let app = TestApp::new().await;
    app.create_promotion(
        storefront_api::entities::promotion::PromotionType::PercentageDiscount,
        1500,
    )
    .await;

    let response = app
        .request(Method::GET, "/api/v1/promotions/active", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["data"][0]["discount_value"], "15.00");

    let admin_list = app
        .request(Method::GET, "/api/v1/promotions", None, None)
        .await;
    assert_eq!(admin_list.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn requests_beyond_the_limit_are_rejected_with_headers() {
    let app = TestApp::with_config(|cfg| {
        cfg.rate_limit.general_max_requests = 2;
    })
    .await;

    for _ in 0..2 {
        let ok = app
            .request(Method::GET, "/api/v1/promotions/active", None, None)
            .await;
        assert_eq!(ok.status(), StatusCode::OK);
        assert!(ok.headers().contains_key("x-ratelimit-limit"));
    }

    let limited = app
        .request(Method::GET, "/api/v1/promotions/active", None, None)
        .await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(limited.headers().contains_key("retry-after"));
    assert_eq!(limited.headers()["x-ratelimit-remaining"], "0");
    let body = json_body(limited).await;
    assert_eq!(body["code"], "rate_limited");
    assert!(body["request_id"].is_string());

    let health = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(health.status(), StatusCode::OK);
}

#[tokio::test]
async fn auth_routes_use_the_stricter_policy() {
    let app = TestApp::with_config(|cfg| {
        cfg.rate_limit.auth_max_requests = 1;
    })
    .await;

    let first = app
        .request(Method::POST, "/api/v1/auth/login", None, None)
        .await;
    assert_eq!(first.status(), StatusCode::NOT_FOUND);

    let second = app
        .request(Method::POST, "/api/v1/auth/login", None, None)
        .await;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

    let general = app
        .request(Method::GET, "/api/v1/promotions/active", None, None)
        .await;
    assert_eq!(general.status(), StatusCode::OK);
}
