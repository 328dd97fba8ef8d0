/*!
 * # Authentication
 *
 * Bearer-token authentication for the storefront API. Tokens are HS256 JWTs
 * whose subject is a user id. Session issuance (login, registration) lives
 * outside this service; [`AuthService::issue_token`] exists for the CLI and
 * for tests.
 *
 * Each request resolves its [`Actor`] once: token subject, then the role from
 * the identity provider, then the role's capabilities.
 */

pub mod rbac;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::entities::user::UserRole;
use crate::errors::ServiceError;
use crate::AppState;
pub use rbac::{Capabilities, Capability};

/// JWT claims carried by storefront bearer tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (user ID)
    pub jti: String, // JWT ID
    pub iat: i64,    // Issued at
    pub exp: i64,    // Expiration
    pub iss: String, // Issuer
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub issuer: String,
    pub token_lifetime: Duration,
}

impl AuthConfig {
    pub fn from_app_config(cfg: &crate::config::AppConfig) -> Self {
        Self {
            jwt_secret: cfg.jwt_secret.clone(),
            issuer: cfg.jwt_issuer.clone(),
            token_lifetime: cfg.jwt_expiration(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing token")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Unknown user")]
    UnknownUser,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::TokenCreation(msg) => ServiceError::InternalError(msg),
            other => ServiceError::Unauthorized(other.to_string()),
        }
    }
}

pub struct AuthService {
    config: AuthConfig,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Issues a signed bearer token for `user_id`.
    pub fn issue_token(&self, user_id: Uuid) -> Result<String, AuthError> {
        let now = Utc::now();
        let lifetime = ChronoDuration::from_std(self.config.token_lifetime)
            .map_err(|_| AuthError::TokenCreation("Invalid token duration".to_string()))?;

        let claims = Claims {
            sub: user_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + lifetime).timestamp(),
            iss: self.config.issuer.clone(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    /// Validates signature, expiry and issuer and returns the claims.
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.issuer.as_str()]);

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })
    }

    pub fn subject(&self, token: &str) -> Result<Uuid, AuthError> {
        let claims = self.validate_token(token)?;
        Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)
    }
}

/// The authenticated caller of a service operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: UserRole,
    pub capabilities: Capabilities,
}

impl Actor {
    pub fn new(user_id: Uuid, role: UserRole) -> Self {
        Self {
            user_id,
            role,
            capabilities: Capabilities::for_role(role),
        }
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn require(&self, capability: Capability) -> Result<(), ServiceError> {
        if self.can(capability) {
            Ok(())
        } else {
            warn!(user_id = %self.user_id, %capability, "capability check failed");
            Err(ServiceError::Forbidden(format!(
                "Missing capability '{}'",
                capability
            )))
        }
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<AppState> for Actor {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(AuthError::MissingToken)?;
        let user_id = state.services.auth.subject(token)?;

        let role = state
            .services
            .identity
            .role(user_id)
            .await?
            .ok_or(AuthError::UnknownUser)?;

        debug!(%user_id, %role, "request authenticated");
        Ok(Actor::new(user_id, role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn service(lifetime_secs: u64) -> AuthService {
        AuthService::new(AuthConfig {
            jwt_secret: "unit_test_signing_secret_with_enough_length".to_string(),
            issuer: "storefront-api".to_string(),
            token_lifetime: Duration::from_secs(lifetime_secs),
        })
    }

    #[test]
    fn issued_token_round_trips_subject() {
        let auth = service(3600);
        let user_id = Uuid::new_v4();
        let token = auth.issue_token(user_id).unwrap();
        assert_eq!(auth.subject(&token).unwrap(), user_id);
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let issuer = AuthService::new(AuthConfig {
            jwt_secret: "a_completely_different_secret_value_here".to_string(),
            issuer: "storefront-api".to_string(),
            token_lifetime: Duration::from_secs(3600),
        });
        let token = issuer.issue_token(Uuid::new_v4()).unwrap();
        assert_matches!(service(3600).validate_token(&token), Err(AuthError::InvalidToken));
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert_matches!(service(3600).subject("not-a-jwt"), Err(AuthError::InvalidToken));
    }

    #[test]
    fn auth_errors_map_to_unauthorized() {
        assert_matches!(
            ServiceError::from(AuthError::TokenExpired),
            ServiceError::Unauthorized(_)
        );
    }

    #[test]
    fn actor_capability_checks() {
        let customer = Actor::new(Uuid::new_v4(), UserRole::Customer);
        assert!(customer.require(Capability::PlaceOrders).is_ok());
        assert_matches!(
            customer.require(Capability::ManageOrders),
            Err(ServiceError::Forbidden(_))
        );
        let admin = Actor::new(Uuid::new_v4(), UserRole::Admin);
        assert!(admin.can(Capability::ManageOrders));
    }
}
