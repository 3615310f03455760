//! `/settings`: the caller's provider/model selection.

use crate::auth::AuthUser;
use crate::db::settings;
use crate::error::AppResult;
use crate::state::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

pub fn router() -> Router<AppState> {
    Router::new().route("/settings", get(get_settings).put(put_settings))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub provider: String,
    pub model: String,
}

async fn get_settings(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<crate::db::models::UserSettings>> {
    let conn = state.db.get()?;
    Ok(Json(settings::get(&conn, auth.id)?))
}

async fn put_settings(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<UpdateSettingsRequest>,
) -> AppResult<Json<crate::db::models::UserSettings>> {
    let conn = state.db.get()?;
    Ok(Json(settings::upsert(&conn, auth.id, &body.provider, &body.model)?))
}
