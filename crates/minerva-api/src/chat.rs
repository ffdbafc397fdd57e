use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use minerva_bot::persona::SYSTEM_PROMPT;
use minerva_types::api::{ApiResponse, ChatReply, ChatRequest, ChatStatus};
use serde_json::json;
use tracing::info;

use crate::error::{ApiError, ApiResult, blocking};
use crate::state::AppState;

fn faq_system_prompt(context: &str) -> String {
    format!(
        "{SYSTEM_PROMPT}\n\n\
         CONTEXTO DEL PROYECTO (información oficial):\n\n{context}\n\n\
         Con base en esta información, responde la pregunta del vecino de forma clara y útil."
    )
}

/// POST /api/chat — one FAQ question, metered per session per day.
pub async fn ask(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Response> {
    let message = req.message.trim().to_string();
    let session_id = req.session_id.trim().to_string();
    if message.is_empty() || session_id.is_empty() {
        return Err(ApiError::validation("Se requiere mensaje y sessionId"));
    }
    if message.chars().count() < 3 {
        return Err(ApiError::validation("El mensaje es demasiado corto"));
    }

    let limit = state.chat_message_limit;
    let session = {
        let db = state.db.clone();
        let sid = session_id.clone();
        blocking(move || db.get_or_create_session(&sid)).await?
    };
    if session.message_count >= limit {
        let body = json!({
            "success": false,
            "message": format!(
                "Has alcanzado el límite de {} preguntas por día. Por favor, intenta mañana.",
                limit
            ),
            "limitReached": true,
        });
        return Ok((StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response());
    }

    let system = faq_system_prompt(state.project_context.as_str());
    let answer = state
        .chat_provider
        .complete(Some(&system), &message)
        .await?;

    let session = {
        let db = state.db.clone();
        let sid = session_id.clone();
        blocking(move || db.increment_session(&sid)).await?
    };
    info!(
        "chat session {} used {}/{}",
        session_id, session.message_count, limit
    );

    let reply = ChatReply {
        response: answer,
        messages_remaining: (limit - session.message_count).max(0),
    };
    Ok(Json(ApiResponse::ok(reply)).into_response())
}

/// GET /api/chat/status/:session_id
pub async fn status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<ApiResponse<ChatStatus>>> {
    let limit = state.chat_message_limit;
    let db = state.db.clone();
    let session = blocking(move || db.get_or_create_session(&session_id)).await?;

    let used = session.message_count;
    Ok(Json(ApiResponse::ok(ChatStatus {
        messages_used: used,
        messages_remaining: (limit - used).max(0),
        limit_reached: used >= limit,
    })))
}
