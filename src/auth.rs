//! Authorization guard: bearer token in, principal out, plus the capability
//! checks every lifecycle operation runs before touching the store.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::handlers::AppState;
use crate::models::Role;

/// The authenticated actor of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: i32,
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    user: Principal,
    iat: i64,
    exp: i64,
}

pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &[u8], ttl_days: i64) -> Self {
        TokenKeys {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: Duration::try_days(ttl_days).unwrap_or(Duration::MAX),
        }
    }

    pub fn issue(&self, principal: Principal) -> Result<String, AppError> {
        let now = Utc::now();
        let expires = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| AppError::Internal("token lifetime out of range".into()))?;
        let claims = Claims {
            user: principal,
            iat: now.timestamp(),
            exp: expires.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("token signing failed: {}", e)))
    }

    pub fn verify(&self, token: &str) -> Result<Principal, AppError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims.user)
            .map_err(|e| {
                debug!("rejected token: {}", e);
                AppError::Unauthorized("invalid or expired token".into())
            })
    }
}

/// Token from `Authorization: Bearer <token>`, or the bare `x-auth-token` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let raw = headers
        .get(AUTHORIZATION)
        .or_else(|| headers.get("x-auth-token"))
        .and_then(|value| value.to_str().ok())?;
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
    (!token.is_empty()).then_some(token)
}

pub fn require_role(principal: &Principal, role: Role) -> Result<(), AppError> {
    require_any_role(principal, &[role])
}

pub fn require_any_role(principal: &Principal, roles: &[Role]) -> Result<(), AppError> {
    if roles.contains(&principal.role) {
        Ok(())
    } else {
        Err(AppError::forbidden(format!(
            "access denied for role {}",
            principal.role
        )))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| AppError::Unauthorized("no token, authorization denied".into()))?;
        state.keys.verify(token)
    }
}
