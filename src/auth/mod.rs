//! Bearer-token validation for merchant-facing endpoints.
//!
//! Identity itself (sign up, password reset, session refresh) lives in an
//! external provider; this module only verifies the tokens it issues and
//! caches per-merchant settings lookups.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::AppState;

pub mod profile_cache;

pub use profile_cache::{Clock, SettingsCache, SystemClock};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Merchant (owner) id.
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
}

#[derive(Clone)]
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_ttl: Duration,
}

impl AuthService {
    pub fn new(secret: &str, token_ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            token_ttl,
        }
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ServiceError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| ServiceError::Unauthorized(format!("invalid token: {}", e)))
    }

    /// Issues a token for the given merchant. Used by tooling and tests;
    /// production tokens come from the identity provider sharing the secret.
    pub fn issue_token(&self, owner_id: Uuid) -> Result<String, ServiceError> {
        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: owner_id,
            exp: now + self.token_ttl.as_secs() as usize,
            iat: now,
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::InternalError(format!("token encoding failed: {}", e)))
    }
}

/// Extractor for merchant-authenticated routes.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedMerchant {
    pub owner_id: Uuid,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedMerchant {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ServiceError::Unauthorized("missing authorization header".into()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ServiceError::Unauthorized("expected bearer token".into()))?;

        let claims = state.auth.verify(token)?;
        Ok(AuthenticatedMerchant {
            owner_id: claims.sub,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_verify() {
        let auth = AuthService::new("test-secret-at-least-32-characters!!", Duration::from_secs(60));
        let owner_id = Uuid::new_v4();
        let token = auth.issue_token(owner_id).unwrap();
        let claims = auth.verify(&token).unwrap();
        assert_eq!(claims.sub, owner_id);
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        let auth = AuthService::new("test-secret-at-least-32-characters!!", Duration::from_secs(60));
        assert!(auth.verify("not-a-token").is_err());
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() {
        let ttl = Duration::from_secs(60);
        let issuer = AuthService::new("first-secret-at-least-32-characters!", ttl);
        let verifier = AuthService::new("other-secret-at-least-32-characters!", ttl);
        let token = issuer.issue_token(Uuid::new_v4()).unwrap();
        assert!(verifier.verify(&token).is_err());
    }
}
