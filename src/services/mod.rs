// Collaborator contracts
pub mod catalog;
pub mod identity;
pub mod notifications;

// Pricing
pub mod coupons;
pub mod discounts;
pub mod pricing;
pub mod promotions;

// Cart and checkout
pub mod cart;
pub mod order_status;
pub mod orders;
