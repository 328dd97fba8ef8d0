pub mod carts;
pub mod common;
pub mod coupons;
pub mod health;
pub mod orders;
pub mod promotions;

use std::sync::Arc;

use crate::auth::AuthService;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    cart::{CartLocks, CartService},
    catalog::{CatalogGateway, DbCatalog},
    coupons::CouponService,
    identity::{DbIdentityProvider, IdentityProvider},
    orders::OrderService,
    pricing::PricingService,
    promotions::PromotionService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub auth: Arc<AuthService>,
    pub identity: Arc<dyn IdentityProvider>,
    pub catalog: Arc<dyn CatalogGateway>,
    pub coupons: Arc<CouponService>,
    pub promotions: Arc<PromotionService>,
    pub pricing: Arc<PricingService>,
    pub cart: Arc<CartService>,
    pub order: Arc<OrderService>,
    pub cart_locks: CartLocks,
}

impl AppServices {
    /// Wires the database-backed collaborators.
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        auth_service: Arc<AuthService>,
    ) -> Self {
        let identity: Arc<dyn IdentityProvider> =
            Arc::new(DbIdentityProvider::new(db_pool.clone()));
        let catalog: Arc<dyn CatalogGateway> = Arc::new(DbCatalog::new(db_pool.clone()));
        Self::with_collaborators(db_pool, event_sender, auth_service, identity, catalog)
    }

    /// Wires the services around caller-supplied identity and catalog
    /// implementations.
    pub fn with_collaborators(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        auth_service: Arc<AuthService>,
        identity: Arc<dyn IdentityProvider>,
        catalog: Arc<dyn CatalogGateway>,
    ) -> Self {
        let cart_locks = CartLocks::new();
        let coupons = Arc::new(CouponService::new(db_pool.clone()));
        let promotions = Arc::new(PromotionService::new(db_pool.clone()));
        let pricing = Arc::new(PricingService::new(
            catalog.clone(),
            coupons.clone(),
            promotions.clone(),
        ));
        let cart = Arc::new(CartService::new(
            db_pool.clone(),
            catalog.clone(),
            pricing.clone(),
            cart_locks.clone(),
            event_sender.clone(),
        ));
        let order = Arc::new(OrderService::new(
            db_pool,
            catalog.clone(),
            pricing.clone(),
            cart.clone(),
            coupons.clone(),
            cart_locks.clone(),
            event_sender,
        ));

        Self {
            auth: auth_service,
            identity,
            catalog,
            coupons,
            promotions,
            pricing,
            cart,
            order,
            cart_locks,
        }
    }
}
