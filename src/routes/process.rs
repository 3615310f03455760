//! `/process/{appId}`: start/stop/status for a workspace's dev server.

use crate::auth::AuthUser;
use crate::db::apps;
use crate::error::AppResult;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/process/:appId/start", post(start))
        .route("/process/:appId/stop", post(stop))
        .route("/process/:appId/status", get(status))
}

#[derive(Debug, Serialize)]
struct StartResponse {
    success: bool,
    port: u16,
    #[serde(rename = "previewUrl")]
    preview_url: String,
}

#[derive(Debug, Serialize)]
struct StopResponse {
    success: bool,
    stopped: bool,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(rename = "previewUrl", skip_serializing_if = "Option::is_none")]
    preview_url: Option<String>,
}

fn preview_url(app_id: i64) -> String {
    format!("/preview/{app_id}/")
}

async fn start(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(app_id): Path<i64>,
) -> AppResult<Json<StartResponse>> {
    let conn = state.db.get()?;
    let app = apps::find_owned(&conn, app_id, auth.id)?;
    drop(conn);

    let root = state.config.storage_path.join(app.relative_root());
    let port = state.supervisor.start(app_id, root).await?;

    Ok(Json(StartResponse { success: true, port, preview_url: preview_url(app_id) }))
}

async fn stop(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(app_id): Path<i64>,
) -> AppResult<Json<StopResponse>> {
    let conn = state.db.get()?;
    apps::find_owned(&conn, app_id, auth.id)?;
    drop(conn);

    let stopped = state.supervisor.stop(app_id).await;
    Ok(Json(StopResponse { success: true, stopped }))
}

async fn status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(app_id): Path<i64>,
) -> AppResult<Json<StatusResponse>> {
    let conn = state.db.get()?;
    apps::find_owned(&conn, app_id, auth.id)?;
    drop(conn);

    let status = state.supervisor.status(app_id).await;
    Ok(Json(StatusResponse {
        running: status.running,
        port: status.port,
        preview_url: status.running.then(|| preview_url(app_id)),
    }))
}
