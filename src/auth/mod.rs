//! Trusted principal carried in an HS256 bearer token.
//!
//! Login and session management live outside this service; the API only
//! verifies the token and reads `{user_id, warehouse_id, role}` from it.

use crate::errors::ServiceError;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Query parameter accepted in place of the `Authorization` header (WebSocket clients)
pub const TOKEN_QUERY_PARAM: &str = "access_token";

/// Claim structure for principal tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub warehouse_id: Option<i32>,
    pub role: String,
    pub exp: i64,
}

/// Authenticated caller as seen by the handlers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub warehouse_id: Option<i32>,
    pub role: String,
}

impl Principal {
    /// The warehouse every alert operation is scoped to.
    pub fn require_warehouse(&self) -> Result<i32, ServiceError> {
        self.warehouse_id
            .ok_or_else(|| ServiceError::BadRequest("User not in a warehouse".to_string()))
    }
}

/// Verifies principal tokens against the configured secret
#[derive(Clone)]
pub struct TokenVerifier {
    decoding: DecodingKey,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Principal, ServiceError> {
        let claims = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ServiceError::Unauthorized("Token expired".to_string())
                }
                _ => ServiceError::Unauthorized("Invalid token".to_string()),
            })?
            .claims;

        let user_id = claims
            .sub
            .parse::<i64>()
            .map_err(|_| ServiceError::Unauthorized("Invalid token subject".to_string()))?;

        Ok(Principal {
            user_id,
            warehouse_id: claims.warehouse_id,
            role: claims.role,
        })
    }
}

/// Signs a principal token; used by operators and tests.
pub fn issue_token(
    secret: &str,
    principal: &Principal,
    ttl: Duration,
) -> Result<String, ServiceError> {
    let claims = Claims {
        sub: principal.user_id.to_string(),
        warehouse_id: principal.warehouse_id,
        role: principal.role.clone(),
        exp: (Utc::now() + ttl).timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ServiceError::InternalError(format!("Token creation failed: {}", e)))
}

fn bearer_token(parts: &Parts) -> Option<String> {
    if let Some(value) = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        return value.strip_prefix("Bearer ").map(|t| t.trim().to_string());
    }

    parts.uri.query().and_then(|query| {
        query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == TOKEN_QUERY_PARAM && !value.is_empty()).then(|| value.to_string())
        })
    })
}

impl<S> FromRequestParts<S> for Principal
where
    Arc<TokenVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let verifier = Arc::<TokenVerifier>::from_ref(state);
        let token = bearer_token(parts)
            .ok_or_else(|| ServiceError::Unauthorized("Missing bearer token".to_string()))?;
        verifier.verify(&token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const SECRET: &str = "a_test_secret_that_is_long_enough_for_hs256_use";

    fn manager() -> Principal {
        Principal {
            user_id: 7,
            warehouse_id: Some(3),
            role: "Manager".to_string(),
        }
    }

    #[test]
    fn issued_token_verifies_to_the_same_principal() {
        let token = issue_token(SECRET, &manager(), Duration::minutes(5)).unwrap();
        let principal = TokenVerifier::new(SECRET).verify(&token).unwrap();
        assert_eq!(principal, manager());
        assert_eq!(principal.require_warehouse().unwrap(), 3);
    }

    #[test]
    fn wrong_secret_is_unauthorized() {
        let token = issue_token(SECRET, &manager(), Duration::minutes(5)).unwrap();
        let err = TokenVerifier::new("another_secret_that_is_also_long_enough!!")
            .verify(&token)
            .unwrap_err();
        assert_matches!(err, ServiceError::Unauthorized(_));
    }

    #[test]
    fn expired_token_is_unauthorized() {
        let token = issue_token(SECRET, &manager(), Duration::hours(-2)).unwrap();
        let err = TokenVerifier::new(SECRET).verify(&token).unwrap_err();
        assert_matches!(err, ServiceError::Unauthorized(msg) if msg == "Token expired");
    }

    #[test]
    fn principal_without_warehouse_is_rejected() {
        let principal = Principal {
            warehouse_id: None,
            ..manager()
        };
        assert_matches!(
            principal.require_warehouse(),
            Err(ServiceError::BadRequest(msg)) if msg == "User not in a warehouse"
        );
    }

    #[test]
    fn token_can_come_from_query_string() {
        let request = axum::http::Request::builder()
            .uri("/ws/warehouses/3?access_token=abc.def")
            .body(())
            .unwrap();
        let (parts, _) = request.into_parts();
        assert_eq!(bearer_token(&parts).as_deref(), Some("abc.def"));
    }
}
