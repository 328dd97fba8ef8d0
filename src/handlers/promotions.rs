use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::common::{
    created_response, double_option, no_content_response, non_negative, positive,
    success_response, PaginationParams, ValidatedJson,
};
use crate::auth::{Actor, Capability};
use crate::entities::promotion::{Model as PromotionModel, PromotionTarget, PromotionType};
use crate::errors::ServiceError;
use crate::money::{self, Cents};
use crate::services::promotions::{CreatePromotionInput, UpdatePromotionInput};
use crate::{AppState, PaginatedResponse};

/// Promotion routes, mounted under `/promotions`. `/active` is public.
pub fn promotion_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_promotions).post(create_promotion))
        .route("/active", get(list_active_promotions))
        .route(
            "/:id",
            get(get_promotion)
                .patch(update_promotion)
                .delete(delete_promotion),
        )
}

async fn create_promotion(
    State(state): State<AppState>,
    actor: Actor,
    ValidatedJson(payload): ValidatedJson<CreatePromotionRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let input = payload.into_input()?;
    let promotion = state.services.promotions.create(&actor, input).await?;
    Ok(created_response(PromotionResponse::from(promotion)))
}

async fn list_promotions(
    State(state): State<AppState>,
    actor: Actor,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, per_page) = params.resolve(&state.config);
    let (promotions, total) = state
        .services
        .promotions
        .list(&actor, page, per_page)
        .await?;
    let items = promotions.into_iter().map(PromotionResponse::from).collect();
    Ok(success_response(PaginatedResponse::new(
        items, page, per_page, total,
    )))
}

/// Promotions a shopper could benefit from right now.
async fn list_active_promotions(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ServiceError> {
    let promotions = state.services.promotions.active_at(Utc::now()).await?;
    let items: Vec<PromotionResponse> = promotions
        .into_iter()
        .map(PromotionResponse::from)
        .collect();
    Ok(success_response(items))
}

async fn get_promotion(
    State(state): State<AppState>,
    actor: Actor,
    Path(promotion_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    actor.require(Capability::ManagePromotions)?;
    let promotion = state.services.promotions.get(promotion_id).await?;
    Ok(success_response(PromotionResponse::from(promotion)))
}

async fn update_promotion(
    State(state): State<AppState>,
    actor: Actor,
    Path(promotion_id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<UpdatePromotionRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let input = payload.into_input()?;
    let promotion = state
        .services
        .promotions
        .update(&actor, promotion_id, input)
        .await?;
    Ok(success_response(PromotionResponse::from(promotion)))
}

async fn delete_promotion(
    State(state): State<AppState>,
    actor: Actor,
    Path(promotion_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.promotions.delete(&actor, promotion_id).await?;
    Ok(no_content_response())
}

fn value_display(promotion_type: PromotionType, value: i64) -> Decimal {
    match promotion_type {
        PromotionType::PercentageDiscount => money::bps_to_percent(value),
        PromotionType::FixedAmountDiscount | PromotionType::FreeShipping => {
            money::to_decimal(value)
        }
    }
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePromotionRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub promotion_type: PromotionType,
    pub target_type: PromotionTarget,
    pub target_id: Option<Uuid>,
    /// Percent for percentage promotions, currency amount otherwise.
    #[validate(custom = "non_negative")]
    pub discount_value: Decimal,
    #[validate(custom = "non_negative")]
    pub min_purchase_amount: Option<Decimal>,
    #[validate(custom = "positive")]
    pub max_discount_amount: Option<Decimal>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl CreatePromotionRequest {
    fn into_input(self) -> Result<CreatePromotionInput, ServiceError> {
        Ok(CreatePromotionInput {
            discount_value: money::from_decimal(self.discount_value)?,
            min_purchase_amount: self
                .min_purchase_amount
                .map(money::from_decimal)
                .transpose()?
                .unwrap_or(0),
            max_discount_amount: self.max_discount_amount.map(money::from_decimal).transpose()?,
            name: self.name,
            description: self.description,
            promotion_type: self.promotion_type,
            target_type: self.target_type,
            target_id: self.target_id,
            start_date: self.start_date,
            end_date: self.end_date,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdatePromotionRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub promotion_type: Option<PromotionType>,
    pub target_type: Option<PromotionTarget>,
    #[serde(default, deserialize_with = "double_option")]
    pub target_id: Option<Option<Uuid>>,
    #[validate(custom = "non_negative")]
    pub discount_value: Option<Decimal>,
    #[validate(custom = "non_negative")]
    pub min_purchase_amount: Option<Decimal>,
    #[serde(default, deserialize_with = "double_option")]
    pub max_discount_amount: Option<Option<Decimal>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

impl UpdatePromotionRequest {
    fn into_input(self) -> Result<UpdatePromotionInput, ServiceError> {
        let max_discount_amount = match self.max_discount_amount {
            Some(amount) => Some(amount.map(money::from_decimal).transpose()?),
            None => None,
        };
        Ok(UpdatePromotionInput {
            name: self.name,
            description: self.description,
            promotion_type: self.promotion_type,
            target_type: self.target_type,
            target_id: self.target_id,
            discount_value: self.discount_value.map(money::from_decimal).transpose()?,
            min_purchase_amount: self.min_purchase_amount.map(money::from_decimal).transpose()?,
            max_discount_amount,
            start_date: self.start_date,
            end_date: self.end_date,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct PromotionResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub promotion_type: PromotionType,
    pub target_type: PromotionTarget,
    pub target_id: Option<Uuid>,
    pub discount_value: Decimal,
    #[serde(serialize_with = "money::serialize_cents")]
    pub min_purchase_amount: Cents,
    #[serde(serialize_with = "money::serialize_optional_cents")]
    pub max_discount_amount: Option<Cents>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
}

impl From<PromotionModel> for PromotionResponse {
    fn from(promotion: PromotionModel) -> Self {
        Self {
            id: promotion.id,
            discount_value: value_display(promotion.promotion_type, promotion.discount_value),
            name: promotion.name,
            description: promotion.description,
            promotion_type: promotion.promotion_type,
            target_type: promotion.target_type,
            target_id: promotion.target_id,
            min_purchase_amount: promotion.min_purchase_amount,
            max_discount_amount: promotion.max_discount_amount,
            start_date: promotion.start_date,
            end_date: promotion.end_date,
            is_active: promotion.is_active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_reads_percent_as_basis_points() {
        let request: CreatePromotionRequest = serde_json::from_value(serde_json::json!({
            "name": "Spring sale",
            "promotion_type": "percentage_discount",
            "target_type": "all_products",
            "discount_value": "15",
            "start_date": "2024-03-01T00:00:00Z",
            "end_date": "2024-03-31T23:59:59Z"
        }))
        .unwrap();
        assert!(request.validate().is_ok());

        let input = request.into_input().unwrap();
        assert_eq!(input.discount_value, 1500);
        assert_eq!(input.min_purchase_amount, 0);
        assert!(input.is_active);
    }

    #[test]
    fn explicit_null_clears_target() {
        let request: UpdatePromotionRequest =
            serde_json::from_value(serde_json::json!({ "target_id": null })).unwrap();
        let input = request.into_input().unwrap();
        assert_eq!(input.target_id, Some(None));
        assert_eq!(input.name, None);
    }
}
