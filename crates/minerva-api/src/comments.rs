use axum::Json;
use axum::extract::{Path, Query, State};
use minerva_db::models::CommentRow;
use minerva_types::api::{ApiResponse, CommentView, CreateCommentRequest};
use serde::Deserialize;
use serde_json::json;

use crate::error::{ApiError, ApiResult, blocking};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CommentQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    50
}

fn view(row: CommentRow) -> CommentView {
    CommentView {
        id: row.id,
        nombre: row.nombre,
        colonia: row.colonia,
        comentario: row.comentario,
        likes: row.likes,
        created_at: row.created_at,
    }
}

/// GET /api/comments — newest first, with the grand total for pagination.
pub async fn list_comments(
    State(state): State<AppState>,
    Query(query): Query<CommentQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let db = state.db.clone();
    let limit = query.limit.min(200);
    let offset = query.offset;
    let (rows, total) = blocking(move || {
        let rows = db.list_comments(limit, offset)?;
        let total = db.count_comments()?;
        Ok((rows, total))
    })
    .await?;

    let comments: Vec<CommentView> = rows.into_iter().map(view).collect();
    Ok(Json(json!({ "success": true, "data": comments, "total": total })))
}

/// POST /api/comments
pub async fn create_comment(
    State(state): State<AppState>,
    Json(req): Json<CreateCommentRequest>,
) -> ApiResult<Json<ApiResponse<CommentView>>> {
    let nombre = req.nombre.trim().to_string();
    let colonia = req.colonia.trim().to_string();
    let comentario = req.comentario.trim().to_string();
    if nombre.is_empty() || colonia.is_empty() || comentario.is_empty() {
        return Err(ApiError::validation(
            "Se requiere nombre, colonia y comentario",
        ));
    }

    let db = state.db.clone();
    let row = blocking(move || db.insert_comment(&nombre, &colonia, &comentario)).await?;
    Ok(Json(ApiResponse::ok(view(row))))
}

/// PUT /api/comments/:id/like
pub async fn like_comment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ApiResponse<CommentView>>> {
    let db = state.db.clone();
    let row = blocking(move || db.like_comment(id))
        .await
        .map_err(|e| match e {
            ApiError::NotFound(_) => ApiError::not_found("Comentario no encontrado"),
            other => other,
        })?;
    Ok(Json(ApiResponse::ok(view(row))))
}
