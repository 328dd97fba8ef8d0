use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, patch},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::common::{
    created_response, no_content_response, success_response, PaginationParams, ValidatedJson,
};
use crate::auth::Actor;
use crate::entities::order::OrderStatus;
use crate::errors::ServiceError;
use crate::services::orders::{OrderFilter, PlaceOrderInput, UpdateOrderInput};
use crate::AppState;

/// Checkout and order management routes, mounted under `/orders`.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders).post(place_order))
        .route("/mine", get(list_my_orders))
        .route(
            "/:id",
            get(get_order).patch(update_order).delete(delete_order),
        )
        .route("/:id/status", patch(update_order_status))
}

/// Converts the caller's cart into an order.
async fn place_order(
    State(state): State<AppState>,
    actor: Actor,
    ValidatedJson(payload): ValidatedJson<PlaceOrderInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.order.place_order(&actor, payload).await?;
    Ok(created_response(order))
}

async fn list_orders(
    State(state): State<AppState>,
    actor: Actor,
    Query(params): Query<OrderListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, per_page) = params.pagination().resolve(&state.config);
    let filter = OrderFilter {
        status: params.status,
        owner_id: params.owner_id,
    };
    let orders = state
        .services
        .order
        .list_orders(&actor, filter, page, per_page)
        .await?;
    Ok(success_response(orders))
}

async fn list_my_orders(
    State(state): State<AppState>,
    actor: Actor,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, per_page) = params.resolve(&state.config);
    let orders = state
        .services
        .order
        .list_my_orders(&actor, page, per_page)
        .await?;
    Ok(success_response(orders))
}

async fn get_order(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state.services.order.get_order(&actor, order_id).await?;
    Ok(success_response(order))
}

async fn update_order(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<UpdateOrderInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .order
        .update_order(&actor, order_id, payload)
        .await?;
    Ok(success_response(order))
}

async fn update_order_status(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .order
        .update_status(&actor, order_id, payload.status)
        .await?;
    Ok(success_response(order))
}

async fn delete_order(
    State(state): State<AppState>,
    actor: Actor,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.order.delete_order(&actor, order_id).await?;
    Ok(no_content_response())
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderListQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub status: Option<OrderStatus>,
    pub owner_id: Option<Uuid>,
}

impl OrderListQuery {
    fn pagination(&self) -> PaginationParams {
        PaginationParams {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}
