use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::common::{success_response, ValidatedJson};
use crate::auth::Actor;
use crate::errors::ServiceError;
use crate::services::cart::AddItemInput;
use crate::AppState;

/// Routes for the caller's own cart, mounted under `/cart`.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/items", post(add_item))
        .route("/items/:id", put(update_item).delete(remove_item))
        .route("/clear", axum::routing::delete(clear_cart))
        .route("/quote", post(quote_cart))
}

async fn get_cart(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.cart.snapshot(&actor).await?;
    Ok(success_response(cart))
}

async fn add_item(
    State(state): State<AppState>,
    actor: Actor,
    ValidatedJson(payload): ValidatedJson<AddItemInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.cart.add_item(&actor, payload).await?;
    Ok(success_response(cart))
}

async fn update_item(
    State(state): State<AppState>,
    actor: Actor,
    Path(item_id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<UpdateQuantityRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state
        .services
        .cart
        .set_quantity(&actor, item_id, payload.quantity)
        .await?;
    Ok(success_response(cart))
}

async fn remove_item(
    State(state): State<AppState>,
    actor: Actor,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.cart.remove_item(&actor, item_id).await?;
    Ok(success_response(cart))
}

async fn clear_cart(
    State(state): State<AppState>,
    actor: Actor,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.cart.clear(&actor).await?;
    Ok(success_response(cart))
}

async fn quote_cart(
    State(state): State<AppState>,
    actor: Actor,
    ValidatedJson(payload): ValidatedJson<QuoteRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let quote = state
        .services
        .cart
        .quote(&actor, payload.coupon_code.as_deref())
        .await?;
    Ok(success_response(quote))
}

/// A quantity of zero or less removes the line.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateQuantityRequest {
    pub quantity: i32,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct QuoteRequest {
    #[validate(length(max = 64))]
    pub coupon_code: Option<String>,
}
