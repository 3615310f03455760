//! `/apps`: workspace CRUD plus favorite toggling and search.

use crate::auth::AuthUser;
use crate::db::{apps, chats};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::workspace_store::WorkspaceStore;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/apps", get(list).post(create))
        .route("/apps/search", get(search))
        .route("/apps/:id", get(get_one).patch(update).delete(remove))
        .route("/apps/:id/favorite", post(favorite))
}

#[derive(Debug, Deserialize)]
pub struct CreateAppRequest {
    pub name: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAppRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(rename = "q")]
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct CreateAppResponse {
    pub app: crate::db::models::App,
    pub chat: crate::db::models::Chat,
}

async fn list(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<crate::db::models::App>>> {
    let conn = state.db.get()?;
    Ok(Json(apps::list_for_user(&conn, auth.id)?))
}

async fn search(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(q): Query<SearchQuery>,
) -> AppResult<Json<Vec<crate::db::models::App>>> {
    let conn = state.db.get()?;
    Ok(Json(apps::search_for_user(&conn, auth.id, &q.query)?))
}

async fn get_one(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<crate::db::models::App>> {
    let conn = state.db.get()?;
    Ok(Json(apps::find_owned(&conn, id, auth.id)?))
}

async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateAppRequest>,
) -> AppResult<Json<CreateAppResponse>> {
    if body.name.trim().is_empty() {
        return Err(AppError::Validation("name must not be empty".to_string()));
    }

    let conn = state.db.get()?;
    let app = apps::create(&conn, auth.id, &body.name, body.template.as_deref())?;
    let chat = chats::create(&conn, app.id, None)?;
    drop(conn);

    let store = WorkspaceStore::new(state.config.storage_path.join(app.relative_root()));
    store.ensure_dir("").await?;
    if let Some(prompt) = body.prompt {
        let _ = prompt; // the initial prompt is consumed by the first generation call, not at creation time
    }

    Ok(Json(CreateAppResponse { app, chat }))
}

async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateAppRequest>,
) -> AppResult<Json<crate::db::models::App>> {
    let conn = state.db.get()?;
    apps::find_owned(&conn, id, auth.id)?;
    Ok(Json(apps::rename(&conn, id, &body.name)?))
}

async fn remove(State(state): State<AppState>, auth: AuthUser, Path(id): Path<i64>) -> AppResult<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    let app = apps::find_owned(&conn, id, auth.id)?;
    apps::delete(&conn, id)?;
    drop(conn);

    state.supervisor.stop(id).await;
    let store = WorkspaceStore::new(state.config.storage_path.join(app.relative_root()));
    if store.exists("").await.unwrap_or(false) {
        let _ = store.delete("").await;
    }

    Ok(Json(serde_json::json!({ "success": true })))
}

async fn favorite(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<crate::db::models::App>> {
    let conn = state.db.get()?;
    apps::find_owned(&conn, id, auth.id)?;
    Ok(Json(apps::toggle_favorite(&conn, id)?))
}
