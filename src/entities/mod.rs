//! SeaORM entities for the storefront schema.
//!
//! Monetary columns hold integer cents; percentage discount values hold
//! basis points.

pub mod cart;
pub mod cart_item;
pub mod coupon;
pub mod order;
pub mod order_item;
pub mod product;
pub mod product_variant;
pub mod promotion;
pub mod user;
