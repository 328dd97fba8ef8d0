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
use crate::entities::coupon::{DiscountType, Model as CouponModel};
use crate::errors::ServiceError;
use crate::money::{self, Cents};
use crate::services::coupons::{CreateCouponInput, UpdateCouponInput};
use crate::{AppState, PaginatedResponse};

/// Admin coupon routes, mounted under `/coupons`.
pub fn coupon_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_coupons).post(create_coupon))
        .route(
            "/:id",
            get(get_coupon).patch(update_coupon).delete(delete_coupon),
        )
}

async fn create_coupon(
    State(state): State<AppState>,
    actor: Actor,
    ValidatedJson(payload): ValidatedJson<CreateCouponRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let input = payload.into_input()?;
    let coupon = state.services.coupons.create(&actor, input).await?;
    Ok(created_response(CouponResponse::from(coupon)))
}

async fn list_coupons(
    State(state): State<AppState>,
    actor: Actor,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, per_page) = params.resolve(&state.config);
    let (coupons, total) = state.services.coupons.list(&actor, page, per_page).await?;
    let items = coupons.into_iter().map(CouponResponse::from).collect();
    Ok(success_response(PaginatedResponse::new(
        items, page, per_page, total,
    )))
}

async fn get_coupon(
    State(state): State<AppState>,
    actor: Actor,
    Path(coupon_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    actor.require(Capability::ManageCoupons)?;
    let coupon = state.services.coupons.get(coupon_id).await?;
    Ok(success_response(CouponResponse::from(coupon)))
}

async fn update_coupon(
    State(state): State<AppState>,
    actor: Actor,
    Path(coupon_id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<UpdateCouponRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let input = payload.into_input()?;
    let coupon = state
        .services
        .coupons
        .update(&actor, coupon_id, input)
        .await?;
    Ok(success_response(CouponResponse::from(coupon)))
}

async fn delete_coupon(
    State(state): State<AppState>,
    actor: Actor,
    Path(coupon_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.coupons.delete(&actor, coupon_id).await?;
    Ok(no_content_response())
}

/// Percentages arrive as `12.5`, amounts as `5.00`.
fn discount_units(discount_type: DiscountType, value: Decimal) -> Result<i64, ServiceError> {
    match discount_type {
        DiscountType::Percentage => money::percent_to_bps(value),
        DiscountType::FixedAmount => money::from_decimal(value),
    }
}

fn discount_display(discount_type: DiscountType, value: i64) -> Decimal {
    match discount_type {
        DiscountType::Percentage => money::bps_to_percent(value),
        DiscountType::FixedAmount => money::to_decimal(value),
    }
}

fn optional_cents(amount: Option<Decimal>) -> Result<Option<Cents>, ServiceError> {
    amount.map(money::from_decimal).transpose()
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCouponRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    pub discount_type: DiscountType,
    #[validate(custom = "positive")]
    pub discount_value: Decimal,
    #[validate(custom = "non_negative")]
    pub min_purchase_amount: Option<Decimal>,
    #[validate(custom = "positive")]
    pub max_discount_amount: Option<Decimal>,
    #[validate(range(min = 1))]
    pub usage_limit: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl CreateCouponRequest {
    fn into_input(self) -> Result<CreateCouponInput, ServiceError> {
        Ok(CreateCouponInput {
            discount_value: discount_units(self.discount_type, self.discount_value)?,
            min_purchase_amount: optional_cents(self.min_purchase_amount)?.unwrap_or(0),
            max_discount_amount: optional_cents(self.max_discount_amount)?,
            code: self.code,
            discount_type: self.discount_type,
            usage_limit: self.usage_limit,
            expires_at: self.expires_at,
            is_active: self.is_active,
        })
    }
}

/// Partial update. `null` clears the nullable terms; an absent field is
/// left untouched.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateCouponRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: Option<String>,
    pub discount_type: Option<DiscountType>,
    #[validate(custom = "positive")]
    pub discount_value: Option<Decimal>,
    #[validate(custom = "non_negative")]
    pub min_purchase_amount: Option<Decimal>,
    #[serde(default, deserialize_with = "double_option")]
    pub max_discount_amount: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "double_option")]
    pub usage_limit: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub is_active: Option<bool>,
}

impl UpdateCouponRequest {
    fn into_input(self) -> Result<UpdateCouponInput, ServiceError> {
        // Percent and amount both store two decimal places.
        let discount_value = self.discount_value.map(money::from_decimal).transpose()?;
        let max_discount_amount = match self.max_discount_amount {
            Some(amount) => Some(optional_cents(amount)?),
            None => None,
        };
        Ok(UpdateCouponInput {
            code: self.code,
            discount_type: self.discount_type,
            discount_value,
            min_purchase_amount: optional_cents(self.min_purchase_amount)?,
            max_discount_amount,
            usage_limit: self.usage_limit,
            expires_at: self.expires_at,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct CouponResponse {
    pub id: Uuid,
    pub code: String,
    pub discount_type: DiscountType,
    /// Percent for percentage coupons, currency amount otherwise.
    pub discount_value: Decimal,
    #[serde(serialize_with = "money::serialize_cents")]
    pub min_purchase_amount: Cents,
    #[serde(serialize_with = "money::serialize_optional_cents")]
    pub max_discount_amount: Option<Cents>,
    pub usage_limit: Option<i32>,
    pub times_used: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CouponModel> for CouponResponse {
    fn from(coupon: CouponModel) -> Self {
        Self {
            id: coupon.id,
            code: coupon.code,
            discount_type: coupon.discount_type,
            discount_value: discount_display(coupon.discount_type, coupon.discount_value),
            min_purchase_amount: coupon.min_purchase_amount,
            max_discount_amount: coupon.max_discount_amount,
            usage_limit: coupon.usage_limit,
            times_used: coupon.times_used,
            expires_at: coupon.expires_at,
            is_active: coupon.is_active,
            created_at: coupon.created_at,
            updated_at: coupon.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn create_request_converts_to_storage_units() {
        let request: CreateCouponRequest = serde_json::from_value(serde_json::json!({
            "code": "save10",
            "discount_type": "percentage",
            "discount_value": "12.5",
            "min_purchase_amount": "20.00",
            "max_discount_amount": "5.00"
        }))
        .unwrap();
        assert!(request.validate().is_ok());
        assert!(request.is_active);

        let input = request.into_input().unwrap();
        assert_eq!(input.discount_value, 1250);
        assert_eq!(input.min_purchase_amount, 2000);
        assert_eq!(input.max_discount_amount, Some(500));
    }

    #[test]
    fn negative_minimum_fails_validation() {
        let request = CreateCouponRequest {
            code: "X".into(),
            discount_type: DiscountType::FixedAmount,
            discount_value: dec!(5),
            min_purchase_amount: Some(dec!(-1)),
            max_discount_amount: None,
            usage_limit: None,
            expires_at: None,
            is_active: true,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn explicit_null_clears_usage_limit() {
        let request: UpdateCouponRequest =
            serde_json::from_value(serde_json::json!({ "usage_limit": null })).unwrap();
        assert_eq!(request.usage_limit, Some(None));

        let untouched: UpdateCouponRequest = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(untouched.usage_limit, None);
    }

    #[test]
    fn responses_render_percent_and_amounts() {
        let now = Utc::now();
        let response = CouponResponse::from(CouponModel {
            id: Uuid::new_v4(),
            code: "SAVE10".into(),
            discount_type: DiscountType::Percentage,
            discount_value: 1000,
            min_purchase_amount: 2000,
            max_discount_amount: None,
            usage_limit: Some(5),
            times_used: 1,
            expires_at: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        });
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["discount_value"], "10.00");
        assert_eq!(json["min_purchase_amount"], "20.00");
        assert!(json["max_discount_amount"].is_null());
    }
}
