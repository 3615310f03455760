//! `/files/app/{appId}/<path>`: direct file-tree access scoped to one
//! workspace, with the same path-safety contract the Tool Executor uses.

use crate::auth::AuthUser;
use crate::db::apps;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::workspace_store::WorkspaceStore;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/files/app/:appId", get(list_root))
        .route(
            "/files/app/:appId/*path",
            get(read_or_list).put(write).delete(remove),
        )
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub recursive: bool,
}

#[derive(Debug, Deserialize)]
pub struct WriteRequest {
    pub content: String,
}

async fn store_for(state: &AppState, app_id: i64, owner: i64) -> AppResult<WorkspaceStore> {
    let conn = state.db.get()?;
    let app = apps::find_owned(&conn, app_id, owner)?;
    Ok(WorkspaceStore::new(state.config.storage_path.join(app.relative_root())))
}

async fn list_root(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(app_id): Path<i64>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let store = store_for(&state, app_id, auth.id).await?;
    list_or_error(&store, "", query.recursive).await
}

async fn read_or_list(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((app_id, path)): Path<(i64, String)>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let store = store_for(&state, app_id, auth.id).await?;

    if store.stat(&path).await.map(|s| s.is_directory).unwrap_or(false) {
        return list_or_error(&store, &path, query.recursive).await;
    }

    let bytes = store.read(&path).await?;
    Ok(Json(serde_json::json!({ "content": String::from_utf8_lossy(&bytes) })))
}

async fn list_or_error(store: &WorkspaceStore, path: &str, recursive: bool) -> AppResult<Json<serde_json::Value>> {
    if recursive {
        let files = store.list_recursive(path, 32).await?;
        return Ok(Json(serde_json::json!({ "files": files })));
    }
    let entries = store.list(path).await?;
    Ok(Json(serde_json::json!({ "files": entries })))
}

async fn write(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((app_id, path)): Path<(i64, String)>,
    Json(body): Json<WriteRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let store = store_for(&state, app_id, auth.id).await?;
    store.write(&path, body.content.as_bytes()).await?;
    Ok(Json(serde_json::json!({ "success": true, "path": path })))
}

async fn remove(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((app_id, path)): Path<(i64, String)>,
) -> AppResult<Json<serde_json::Value>> {
    let store = store_for(&state, app_id, auth.id).await?;
    store.delete(&path).await.map_err(|err| match err {
        AppError::NotFound(_) => AppError::NotFound("file not found".to_string()),
        other => other,
    })?;
    Ok(Json(serde_json::json!({ "success": true, "path": path })))
}
