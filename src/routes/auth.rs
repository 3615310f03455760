//! `/auth/*`: registration, login, and token verification.

use crate::auth::{issue_token, AuthUser};
use crate::db::users;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: crate::db::models::PublicUser,
    pub token: String,
}

async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<Json<AuthResponse>> {
    if body.email.trim().is_empty() || body.password.len() < 8 {
        return Err(AppError::Validation(
            "email must be set and password must be at least 8 characters".to_string(),
        ));
    }

    let hash = bcrypt::hash(&body.password, bcrypt::DEFAULT_COST)
        .map_err(|err| AppError::Internal(anyhow::anyhow!(err)))?;

    let conn = state.db.get()?;
    let user = users::create(&conn, &body.email, &body.name, &hash)?;
    let token = issue_token(&user, &state.config.jwt_secret)?;

    Ok(Json(AuthResponse { user: user.public(), token }))
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let conn = state.db.get()?;
    let user = users::find_by_email(&conn, &body.email)?
        .ok_or_else(|| AppError::Auth("invalid email or password".to_string()))?;

    let matches = bcrypt::verify(&body.password, &user.password_hash)
        .map_err(|err| AppError::Internal(anyhow::anyhow!(err)))?;
    if !matches {
        return Err(AppError::Auth("invalid email or password".to_string()));
    }

    let token = issue_token(&user, &state.config.jwt_secret)?;
    Ok(Json(AuthResponse { user: user.public(), token }))
}

async fn me(auth: AuthUser) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "id": auth.id,
        "email": auth.email,
        "name": auth.name,
    }))
}
