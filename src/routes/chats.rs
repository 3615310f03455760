//! `/chats`: chat CRUD under a workspace, plus its message history.

use crate::auth::AuthUser;
use crate::db::{apps, chats, messages, models::Role};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chats/app/:appId", get(list_for_app))
        .route("/chats/app/:appId/search", get(search_for_app))
        .route("/chats/:id", get(get_one).patch(update).delete(remove))
        .route("/chats/:id/messages", get(list_messages).post(append_message))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(rename = "q")]
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateChatRequest {
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AppendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub request_id: Option<String>,
}

async fn owned_app(state: &AppState, app_id: i64, owner: i64) -> AppResult<()> {
    let conn = state.db.get()?;
    apps::find_owned(&conn, app_id, owner)?;
    Ok(())
}

async fn owned_chat(state: &AppState, chat_id: i64, owner: i64) -> AppResult<crate::db::models::Chat> {
    let conn = state.db.get()?;
    let chat = chats::find_by_id(&conn, chat_id)?.ok_or_else(|| AppError::NotFound("chat not found".to_string()))?;
    apps::find_owned(&conn, chat.app_id, owner)?;
    Ok(chat)
}

async fn list_for_app(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(app_id): Path<i64>,
) -> AppResult<Json<Vec<crate::db::models::Chat>>> {
    owned_app(&state, app_id, auth.id).await?;
    let conn = state.db.get()?;
    Ok(Json(chats::list_for_app(&conn, app_id)?))
}

async fn search_for_app(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(app_id): Path<i64>,
    Query(q): Query<SearchQuery>,
) -> AppResult<Json<Vec<crate::db::models::Chat>>> {
    owned_app(&state, app_id, auth.id).await?;
    let conn = state.db.get()?;
    Ok(Json(chats::search_for_app(&conn, app_id, &q.query)?))
}

async fn get_one(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<crate::db::models::Chat>> {
    Ok(Json(owned_chat(&state, id, auth.id).await?))
}

async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateChatRequest>,
) -> AppResult<Json<crate::db::models::Chat>> {
    owned_chat(&state, id, auth.id).await?;
    let conn = state.db.get()?;
    Ok(Json(chats::rename(&conn, id, body.title.as_deref())?))
}

async fn remove(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<serde_json::Value>> {
    owned_chat(&state, id, auth.id).await?;
    let conn = state.db.get()?;
    chats::delete(&conn, id)?;
    Ok(Json(serde_json::json!({ "success": true })))
}

async fn list_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Vec<crate::db::models::Message>>> {
    owned_chat(&state, id, auth.id).await?;
    let conn = state.db.get()?;
    Ok(Json(messages::list_for_chat(&conn, id)?))
}

async fn append_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<AppendMessageRequest>,
) -> AppResult<Json<crate::db::models::Message>> {
    owned_chat(&state, id, auth.id).await?;
    let conn = state.db.get()?;
    Ok(Json(messages::append(&conn, id, Role::User, &body.content, body.request_id.as_deref())?))
}
