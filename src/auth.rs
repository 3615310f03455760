//! Bearer token issuance and verification.
//!
//! Token *verification* is the component in scope per the spec; issuance is
//! the minimal symmetric-key signer needed to make `/auth/register` and
//! `/auth/login` hand back something `GET /auth/me` can verify (see
//! SPEC_FULL.md §6). Tokens are HS256 JWTs carrying `{id, email, name}`.

use crate::db::models::User;
use crate::error::AppError;
use crate::state::AppState;
use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub name: String,
    pub exp: i64,
}

const TOKEN_TTL_SECS: i64 = 60 * 60 * 24 * 30; // 30 days

pub fn issue_token(user: &User, secret: &str) -> Result<String, AppError> {
    let claims = Claims {
        sub: user.id.to_string(),
        email: user.email.clone(),
        name: user.name.clone(),
        exp: chrono::Utc::now().timestamp() + TOKEN_TTL_SECS,
    };
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|err| AppError::Internal(anyhow::anyhow!(err)))
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Auth("invalid or expired token".to_string()))
}

/// The `{id, email, name}` shape the spec says token verification surfaces.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i64,
    pub email: String,
    pub name: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Auth("missing authorization header".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Auth("authorization header must be a bearer token".to_string()))?;

        let claims = verify_token(token, &app_state.config.jwt_secret)?;
        let id = claims
            .sub
            .parse::<i64>()
            .map_err(|_| AppError::Auth("malformed token subject".to_string()))?;

        Ok(AuthUser {
            id,
            email: claims.email,
            name: claims.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: 42,
            email: "a@example.com".to_string(),
            name: "Ada".to_string(),
            password_hash: String::new(),
            created_at: String::new(),
        }
    }

    #[test]
    fn round_trips_through_issue_and_verify() {
        let user = sample_user();
        let token = issue_token(&user, "secret").unwrap();
        let claims = verify_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.email, "a@example.com");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let user = sample_user();
        let token = issue_token(&user, "secret").unwrap();
        let err = verify_token(&token, "other-secret").unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
    }
}
