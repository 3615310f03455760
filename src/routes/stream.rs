//! `/stream/{chatId}` and `/stream/cancel/{streamId}`: the Generation
//! Pipeline's SSE entry points.

use crate::auth::AuthUser;
use crate::db::{apps, chats};
use crate::error::AppResult;
use crate::generation::{self, GenerationRequest};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stream/:chatId", post(start_stream))
        .route("/stream/cancel/:streamId", post(cancel))
}

#[derive(Debug, Deserialize)]
pub struct StreamRequest {
    pub prompt: String,
    #[serde(default)]
    pub redo: bool,
}

async fn start_stream(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
    Json(body): Json<StreamRequest>,
) -> AppResult<Sse<impl futures::Stream<Item = Result<Event, Infallible>>>> {
    let conn = state.db.get()?;
    let chat = chats::find_by_id(&conn, chat_id)?
        .ok_or_else(|| crate::error::AppError::NotFound("chat not found".to_string()))?;
    let app = apps::find_owned(&conn, chat.app_id, auth.id)?;
    drop(conn);

    let request = GenerationRequest {
        chat_id,
        owner_user_id: auth.id,
        workspace_root: state.config.storage_path.join(app.relative_root()),
        prompt: body.prompt,
        redo: body.redo,
    };

    let frames = generation::run(state, request).map(|payload| Ok(Event::default().data(payload)));
    Ok(Sse::new(frames))
}

async fn cancel(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(stream_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    generation::cancel_stream(&state, &stream_id, auth.id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}
