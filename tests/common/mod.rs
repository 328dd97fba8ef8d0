#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request},
    Router,
};
use chrono::{DateTime, Duration, Utc};
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::Value;
use storefront_api::{
    api_router,
    auth::Actor,
    config::AppConfig,
    db::{self, DbConfig},
    entities::{
        coupon::{self, DiscountType},
        product, product_variant,
        promotion::{self, PromotionTarget, PromotionType},
        user::{self, UserRole},
    },
    events::{self, EventSender},
    services::notifications::LogNotifier,
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "integration_test_signing_secret_with_32_plus_chars";

/// Application state over a fresh in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Builds the app after letting the caller adjust the configuration.
    pub async fn with_config(adjust: impl FnOnce(&mut AppConfig)) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx, Arc::new(LogNotifier)));
        Self::build(adjust, event_tx, event_task).await
    }

    /// Event channel with a single slot that nothing drains.
    pub async fn with_stalled_events() -> Self {
        let (event_tx, event_rx) = mpsc::channel(1);
        let event_task = tokio::spawn(async move {
            let _held = event_rx;
            std::future::pending::<()>().await
        });
        Self::build(|_| {}, event_tx, event_task).await
    }

    async fn build(
        adjust: impl FnOnce(&mut AppConfig),
        event_tx: mpsc::Sender<events::Event>,
        event_task: tokio::task::JoinHandle<()>,
    ) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            TEST_JWT_SECRET.to_string(),
            "test".to_string(),
        );
        cfg.cors_allow_any_origin = true;
        adjust(&mut cfg);

        let pool = db::establish_connection_with_config(&DbConfig::in_memory_sqlite())
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let state = AppState::new(Arc::new(pool), cfg, EventSender::new(event_tx));
        let router = api_router(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    pub fn db(&self) -> &sea_orm::DatabaseConnection {
        &self.state.db
    }

    pub async fn create_user(&self, role: UserRole) -> user::Model {
        let id = Uuid::new_v4();
        user::ActiveModel {
            id: Set(id),
            email: Set(format!("{}@example.com", id.simple())),
            name: Set(format!("Test {}", role)),
            role: Set(role),
            created_at: Set(Utc::now()),
        }
        .insert(self.db())
        .await
        .expect("seed user")
    }

    pub async fn customer(&self) -> Actor {
        let user = self.create_user(UserRole::Customer).await;
        Actor::new(user.id, user.role)
    }

    pub async fn admin(&self) -> Actor {
        let user = self.create_user(UserRole::Admin).await;
        Actor::new(user.id, user.role)
    }

    pub fn token_for(&self, actor: &Actor) -> String {
        self.state
            .services
            .auth
            .issue_token(actor.user_id)
            .expect("issue test token")
    }

    pub async fn create_product(&self, price: i64, stock: i32) -> product::Model {
        self.create_product_in(None, price, stock).await
    }

    pub async fn create_product_in(
        &self,
        category_id: Option<Uuid>,
        price: i64,
        stock: i32,
    ) -> product::Model {
        let now = Utc::now();
        let id = Uuid::new_v4();
        product::ActiveModel {
            id: Set(id),
            name: Set(format!("Product {}", &id.simple().to_string()[..8])),
            category_id: Set(category_id),
            price: Set(price),
            stock: Set(stock),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db())
        .await
        .expect("seed product")
    }

    pub async fn create_variant(
        &self,
        product_id: Uuid,
        price: i64,
        stock: i32,
    ) -> product_variant::Model {
        let now = Utc::now();
        let id = Uuid::new_v4();
        product_variant::ActiveModel {
            id: Set(id),
            product_id: Set(product_id),
            sku: Set(format!("SKU-{}", id.simple())),
            name: Set("Variant".to_string()),
            price: Set(price),
            stock: Set(stock),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db())
        .await
        .expect("seed variant")
    }

    pub async fn set_product_price(&self, product_id: Uuid, price: i64) {
        let mut active: product::ActiveModel = self.product(product_id).await.into();
        active.price = Set(price);
        active.update(self.db()).await.expect("update price");
    }

    pub async fn product(&self, product_id: Uuid) -> product::Model {
        product::Entity::find_by_id(product_id)
            .one(self.db())
            .await
            .expect("load product")
            .expect("product exists")
    }

    pub async fn variant(&self, variant_id: Uuid) -> product_variant::Model {
        product_variant::Entity::find_by_id(variant_id)
            .one(self.db())
            .await
            .expect("load variant")
            .expect("variant exists")
    }

    /// Percentage coupon; `percent_bps` in basis points, `min` in cents.
    pub async fn create_coupon(
        &self,
        code: &str,
        percent_bps: i64,
        min: i64,
        usage_limit: Option<i32>,
    ) -> coupon::Model {
        self.insert_coupon(code, DiscountType::Percentage, percent_bps, min, usage_limit, None)
            .await
    }

    pub async fn insert_coupon(
        &self,
        code: &str,
        discount_type: DiscountType,
        value: i64,
        min: i64,
        usage_limit: Option<i32>,
        expires_at: Option<DateTime<Utc>>,
    ) -> coupon::Model {
        let now = Utc::now();
        coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_uppercase()),
            discount_type: Set(discount_type),
            discount_value: Set(value),
            min_purchase_amount: Set(min),
            max_discount_amount: Set(None),
            usage_limit: Set(usage_limit),
            times_used: Set(0),
            expires_at: Set(expires_at),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db())
        .await
        .expect("seed coupon")
    }

    pub async fn coupon(&self, coupon_id: Uuid) -> coupon::Model {
        coupon::Entity::find_by_id(coupon_id)
            .one(self.db())
            .await
            .expect("load coupon")
            .expect("coupon exists")
    }

    /// Site-wide promotion running from an hour ago for a week.
    pub async fn create_promotion(
        &self,
        promotion_type: PromotionType,
        value: i64,
    ) -> promotion::Model {
        let now = Utc::now();
        promotion::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(format!("{} promotion", promotion_type)),
            description: Set(None),
            promotion_type: Set(promotion_type),
            target_type: Set(PromotionTarget::AllProducts),
            target_id: Set(None),
            discount_value: Set(value),
            min_purchase_amount: Set(0),
            max_discount_amount: Set(None),
            start_date: Set(now - Duration::hours(1)),
            end_date: Set(now + Duration::days(7)),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db())
        .await
        .expect("seed promotion")
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is json")
}
