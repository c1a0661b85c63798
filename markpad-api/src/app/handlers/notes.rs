use axum::extract::{Query, State};
use axum::Json;
use markpad_core::{NoteContent, NoteSummary};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::app::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct NoteQuery {
    pub path: String,
}

/// 列出允许目录下的所有可编辑文件。
#[instrument(skip_all)]
pub async fn list_notes(State(state): State<AppState>) -> Result<Json<Vec<NoteSummary>>, ApiError> {
    let notes = state.store.list_notes().await?;
    Ok(Json(notes))
}

/// 读取单个文件；准入检查在 store 内部完成，拒绝时对外只有通用 403。
#[instrument(skip_all)]
pub async fn get_note(
    State(state): State<AppState>,
    Query(query): Query<NoteQuery>,
) -> Result<Json<NoteContent>, ApiError> {
    let note = state.store.read_note(&query.path).await?;
    Ok(Json(note))
}

/// 保存单个文件（内容净化与大小校验同样在 store 内部）。
#[instrument(skip_all)]
pub async fn save_note(
    State(state): State<AppState>,
    Json(payload): Json<NoteContent>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .store
        .write_note(&payload.path, &payload.content)
        .await?;
    Ok(Json(json!({ "saved": true })))
}
