use axum::Json;
use axum::extract::{Path, State};
use minerva_types::api::{AddReactionRequest, ApiResponse, ReactionGroup, RemoveReactionRequest};
use tracing::info;

use crate::error::{ApiError, ApiResult, blocking};
use crate::state::AppState;

async fn groups_for(state: &AppState, message_id: i64) -> ApiResult<Vec<ReactionGroup>> {
    let db = state.db.clone();
    let rows = blocking(move || db.reactions_by_message(message_id)).await?;
    Ok(rows
        .into_iter()
        .map(|r| ReactionGroup {
            emoji: r.emoji,
            count: r.count,
            users: r.users,
        })
        .collect())
}

async fn require_message(state: &AppState, message_id: i64) -> ApiResult<()> {
    let db = state.db.clone();
    match blocking(move || db.get_message(message_id)).await? {
        Some(_) => Ok(()),
        None => Err(ApiError::not_found("Mensaje no encontrado")),
    }
}

/// GET /api/messages/:id/reactions
pub async fn get_reactions(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
) -> ApiResult<Json<ApiResponse<Vec<ReactionGroup>>>> {
    require_message(&state, message_id).await?;
    let groups = groups_for(&state, message_id).await?;
    Ok(Json(ApiResponse::ok(groups)))
}

/// POST /api/messages/:id/reactions — one reaction per (message, user);
/// reacting again switches the emoji.
pub async fn add_reaction(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
    Json(req): Json<AddReactionRequest>,
) -> ApiResult<Json<ApiResponse<Vec<ReactionGroup>>>> {
    if req.user_name.trim().is_empty()
        || req.user_colonia.trim().is_empty()
        || req.emoji.trim().is_empty()
    {
        return Err(ApiError::validation(
            "Se requiere userName, userColonia y emoji",
        ));
    }
    require_message(&state, message_id).await?;

    let db = state.db.clone();
    let user_name = req.user_name.trim().to_string();
    let user_colonia = req.user_colonia.trim().to_string();
    let emoji = req.emoji.trim().to_string();
    blocking(move || db.upsert_reaction(message_id, &user_name, &user_colonia, &emoji)).await?;
    info!("reaction on message {} by {}", message_id, req.user_name);

    let groups = groups_for(&state, message_id).await?;
    Ok(Json(ApiResponse::ok(groups)))
}

/// DELETE /api/messages/:id/reactions — removing a reaction that does not
/// exist is not an error.
pub async fn remove_reaction(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
    Json(req): Json<RemoveReactionRequest>,
) -> ApiResult<Json<ApiResponse<Vec<ReactionGroup>>>> {
    if req.user_name.trim().is_empty() {
        return Err(ApiError::validation("Se requiere userName"));
    }
    require_message(&state, message_id).await?;

    let db = state.db.clone();
    let user_name = req.user_name.trim().to_string();
    blocking(move || db.remove_reaction(message_id, &user_name)).await?;

    let groups = groups_for(&state, message_id).await?;
    Ok(Json(ApiResponse::ok(groups)))
}
