use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use validator::{Validate, ValidationError};

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::{ApiResponse, PaginatedResponse};

/// Standard success response
pub fn success_response<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
}

/// Standard created response
pub fn created_response<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::success(data))).into_response()
}

/// Standard no content response
pub fn no_content_response() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// JSON body that is deserialized and validated before reaching the
/// handler. Malformed bodies and validation failures become `BadRequest`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ServiceError::BadRequest(rejection.body_text()))?;
        value.validate()?;
        Ok(Self(value))
    }
}

/// Pagination parameters for list operations
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PaginationParams {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl PaginationParams {
    /// One-based page and a page size clamped to the configured maximum.
    pub fn resolve(&self, config: &AppConfig) -> (u64, u64) {
        (self.page.unwrap_or(1).max(1), config.page_size(self.per_page))
    }
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, page: u64, limit: u64, total: u64) -> Self {
        let total_pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`) in patch bodies. Use with `#[serde(default)]`.
pub fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

pub fn non_negative(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ValidationError::new("must_not_be_negative"));
    }
    Ok(())
}

pub fn positive(amount: &Decimal) -> Result<(), ValidationError> {
    if *amount <= Decimal::ZERO {
        return Err(ValidationError::new("must_be_positive"));
    }
    Ok(())
}
