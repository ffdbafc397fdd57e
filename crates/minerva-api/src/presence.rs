use axum::Json;
use axum::extract::State;
use minerva_types::api::{ApiResponse, PresenceRequest, PresenceUser};
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

fn validate(req: &PresenceRequest) -> ApiResult<(String, String)> {
    let name = req.user_name.trim();
    let colonia = req.user_colonia.trim();
    if name.is_empty() || colonia.is_empty() {
        return Err(ApiError::validation("Se requiere userName y userColonia"));
    }
    Ok((name.to_string(), colonia.to_string()))
}

/// POST /api/messages/typing/start
pub async fn typing_start(
    State(state): State<AppState>,
    Json(req): Json<PresenceRequest>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let (name, colonia) = validate(&req)?;
    state.typing.mark_active(&name, &colonia);
    Ok(Json(ApiResponse::message("Estado de escritura actualizado")))
}

/// POST /api/messages/typing/stop
pub async fn typing_stop(
    State(state): State<AppState>,
    Json(req): Json<PresenceRequest>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let (name, colonia) = validate(&req)?;
    state.typing.clear(&name, &colonia);
    Ok(Json(ApiResponse::message("Estado de escritura removido")))
}

/// GET /api/messages/typing — users typing right now.
pub async fn typing_list(
    State(state): State<AppState>,
) -> Json<ApiResponse<Vec<PresenceUser>>> {
    Json(ApiResponse::ok(state.typing.list()))
}

/// POST /api/messages/active/heartbeat
pub async fn active_heartbeat(
    State(state): State<AppState>,
    Json(req): Json<PresenceRequest>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let (name, colonia) = validate(&req)?;
    state.active.mark_active(&name, &colonia);
    Ok(Json(ApiResponse::message("Heartbeat registrado")))
}

/// GET /api/messages/active — users seen in the last 30 seconds.
pub async fn active_list(
    State(state): State<AppState>,
) -> Json<ApiResponse<Vec<PresenceUser>>> {
    Json(ApiResponse::ok(state.active.list()))
}

/// GET /api/messages/active/count
pub async fn active_count(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "success": true, "count": state.active.count() }))
}
