use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::entities::order::OrderStatus;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Uniform error envelope returned by every endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// `fail` for client errors, `error` for server errors
    pub status: String,
    /// HTTP status category (e.g., "Not Found", "Too Many Requests")
    pub error: String,
    /// Machine-readable error kind (e.g., "out_of_stock")
    pub code: String,
    /// Human-readable error description
    pub message: String,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// RFC 3339 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Out of stock: {0}")]
    OutOfStock(String),

    #[error("Invalid coupon: {0}")]
    InvalidCoupon(String),

    #[error("Cannot transition order from '{from}' to '{to}'")]
    InvalidStatusTransition { from: OrderStatus, to: OrderStatus },

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::BadRequest(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::OutOfStock(_) | Self::InvalidCoupon(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidStatusTransition { .. } => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::DatabaseError(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable kind used in the `code` field of the envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::OutOfStock(_) => "out_of_stock",
            Self::InvalidCoupon(_) => "invalid_coupon",
            Self::InvalidStatusTransition { .. } => "invalid_status_transition",
            Self::RateLimited => "rate_limited",
            Self::DatabaseError(_) | Self::InternalError(_) => "internal_error",
        }
    }

    /// True for unclassified failures (storage unavailable, programming defects).
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DatabaseError(_) | Self::InternalError(_))
    }

    /// Returns the error message suitable for HTTP responses.
    /// Fatal errors return a generic message to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        if self.is_fatal() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if self.is_fatal() {
            error!(error = %self, "request failed with an unexpected error");
        }

        let err = ErrorResponse {
            status: if status.is_server_error() { "error" } else { "fail" }.to_string(),
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.code().to_string(),
            message: self.response_message(),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}
