//! Storefront API Library
//!
//! Cart, pricing and checkout core of an online store: per-user carts,
//! promotion and coupon pricing, order placement with its status lifecycle,
//! and request admission control.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod money;
pub mod rate_limiter;
pub mod services;
pub mod tracing;

use axum::{http::HeaderValue, middleware, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::auth::{AuthConfig, AuthService};
use crate::rate_limiter::{RateLimitBackend, RateLimitConfig, RateLimitLayer, RateLimiter};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: Arc<events::EventSender>,
    pub services: handlers::AppServices,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    /// Wires database-backed services and the configured rate limiter.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let event_sender = Arc::new(event_sender);
        let auth = Arc::new(AuthService::new(AuthConfig::from_app_config(&config)));
        let services = handlers::AppServices::new(db.clone(), event_sender.clone(), auth);
        Self::with_services(db, config, event_sender, services)
    }

    pub fn with_services(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: Arc<events::EventSender>,
        services: handlers::AppServices,
    ) -> Self {
        let rate_limiter = RateLimiter::new(
            RateLimitConfig::from_settings(&config.rate_limit),
            RateLimitBackend::from_settings(&config.rate_limit),
        );
        Self {
            db,
            config,
            event_sender,
            services,
            rate_limiter,
        }
    }
}

// Common response wrappers
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Routes under `/api/v1`.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .nest("/cart", handlers::carts::cart_routes())
        .nest("/orders", handlers::orders::order_routes())
        .nest("/coupons", handlers::coupons::coupon_routes())
        .nest("/promotions", handlers::promotions::promotion_routes())
        .nest("/health", handlers::health::health_routes())
}

fn cors_layer(config: &config::AppConfig) -> CorsLayer {
    if config.should_allow_permissive_cors() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = config
        .cors_origins()
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                ::tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Full application router.
///
/// Request ids are assigned before admission control so rejected requests
/// still carry one in their error envelope.
pub fn api_router(state: AppState) -> Router {
    let mut router = Router::new()
        .nest("/api/v1", api_v1_routes())
        .nest("/health", handlers::health::health_routes())
        .layer(cors_layer(&state.config))
        .layer(crate::tracing::configure_http_tracing());

    if state.config.rate_limit.enabled {
        router = router.layer(RateLimitLayer::new(state.rate_limiter.clone()));
    }

    router
        .layer(middleware::from_fn(crate::tracing::request_id_middleware))
        .with_state(state)
}
