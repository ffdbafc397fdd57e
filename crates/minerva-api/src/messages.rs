use axum::Json;
use axum::extract::{Multipart, Path, Query, State};
use chrono::{DateTime, Utc};
use minerva_db::models::{AnnotatedMessageRow, MessageRow, NewMessage};
use minerva_types::api::{ApiResponse, MessageView};
use minerva_types::models::MediaKind;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::error::{ApiError, ApiResult, blocking};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    100
}

pub(crate) fn view_from_annotated(row: AnnotatedMessageRow) -> MessageView {
    let m = row.message;
    MessageView {
        id: m.id,
        user_name: m.user_name,
        user_colonia: m.user_colonia,
        message_text: m.message_text,
        media_type: m.media_type,
        media_url: m.media_url,
        media_filename: m.media_filename,
        media_analysis: m.media_analysis,
        reply_to_id: m.reply_to_id,
        is_bot: m.is_bot,
        analyzed_by_bot: m.analyzed_by_bot,
        created_at: m.created_at,
        reply_to_user_name: row.reply_to_user_name,
        reply_to_message_text: row.reply_to_message_text,
        reply_to_media_type: row.reply_to_media_type,
    }
}

fn view_from_row(m: MessageRow) -> MessageView {
    view_from_annotated(AnnotatedMessageRow {
        message: m,
        reply_to_user_name: None,
        reply_to_message_text: None,
        reply_to_media_type: None,
    })
}

/// GET /api/messages — the most recent window, oldest first.
pub async fn get_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
) -> ApiResult<Json<ApiResponse<Vec<MessageView>>>> {
    let db = state.db.clone();
    let limit = query.limit.min(500);
    let rows = blocking(move || db.get_recent(limit)).await?;
    let views = rows.into_iter().map(view_from_annotated).collect();
    Ok(Json(ApiResponse::ok(views)))
}

/// GET /api/messages/since/:timestamp — strictly newer messages, for polling.
pub async fn get_since(
    State(state): State<AppState>,
    Path(timestamp): Path<String>,
) -> ApiResult<Json<ApiResponse<Vec<MessageView>>>> {
    let since: DateTime<Utc> = timestamp
        .parse()
        .map_err(|_| ApiError::validation("Timestamp inválido"))?;

    let db = state.db.clone();
    let rows = blocking(move || db.get_since(since)).await?;
    let views = rows.into_iter().map(view_from_annotated).collect();
    Ok(Json(ApiResponse::ok(views)))
}

/// POST /api/messages — multipart form: userName, userColonia, optional
/// messageText, optional replyToId, optional media file.
pub async fn create_message(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<ApiResponse<MessageView>>> {
    let mut user_name = None;
    let mut user_colonia = None;
    let mut message_text = None;
    let mut reply_to_id = None;
    let mut media: Option<(String, MediaKind, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("Formulario inválido: {}", e)))?
    {
        match field.name().unwrap_or_default() {
            "userName" => user_name = Some(read_text(field).await?),
            "userColonia" => user_colonia = Some(read_text(field).await?),
            "messageText" => message_text = Some(read_text(field).await?),
            "replyToId" => {
                let raw = read_text(field).await?;
                if !raw.trim().is_empty() {
                    reply_to_id = Some(
                        raw.trim()
                            .parse::<i64>()
                            .map_err(|_| ApiError::validation("replyToId inválido"))?,
                    );
                }
            }
            "media" => {
                let filename = field.file_name().unwrap_or("archivo").to_string();
                let kind = field
                    .content_type()
                    .map(MediaKind::from_mime)
                    .unwrap_or(MediaKind::None);
                if kind == MediaKind::None {
                    return Err(ApiError::validation(
                        "Tipo de archivo no permitido. Solo imágenes, audios y videos.",
                    ));
                }
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::validation(format!("Archivo inválido: {}", e)))?;
                media = Some((filename, kind, data.to_vec()));
            }
            _ => {}
        }
    }

    let user_name = user_name.map(|s| s.trim().to_string()).unwrap_or_default();
    let user_colonia = user_colonia.map(|s| s.trim().to_string()).unwrap_or_default();
    if user_name.is_empty() || user_colonia.is_empty() {
        return Err(ApiError::validation("Se requiere nombre y colonia"));
    }
    let message_text = message_text
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    if message_text.is_none() && media.is_none() {
        return Err(ApiError::validation(
            "Se requiere texto o archivo multimedia",
        ));
    }

    let mut new = NewMessage {
        user_name,
        user_colonia,
        message_text,
        reply_to_id,
        ..Default::default()
    };

    let mut stored_filename = None;
    if let Some((original_name, kind, data)) = media {
        let stored = state.storage.save(&original_name, &data).await?;
        new.media_type = kind;
        new.media_url = Some(stored.url);
        stored_filename = Some(stored.filename.clone());
        new.media_filename = Some(stored.filename);
    }

    let db = state.db.clone();
    let inserted = blocking(move || {
        let id = db.insert_message(&new)?;
        db.get_message(id)
    })
    .await;

    let row = match inserted {
        Ok(Some(row)) => row,
        Ok(None) => return Err(ApiError::Internal(anyhow::anyhow!("inserted row vanished"))),
        Err(e) => {
            // keep disk and table consistent
            if let Some(filename) = stored_filename {
                if let Err(cleanup) = state.storage.remove(&filename).await {
                    error!("rollback of upload {} failed: {}", filename, cleanup);
                }
            }
            return Err(e);
        }
    };

    info!("message {} stored from {}", row.id, row.user_name);
    Ok(Json(ApiResponse::ok(view_from_row(row))))
}

/// GET /api/messages/bot/typing — whether the moderator is mid-analysis.
pub async fn bot_typing(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "success": true, "isTyping": state.moderator.is_typing() }))
}

/// GET /api/messages/podcast/id — id of the seeded podcast message.
pub async fn podcast_id(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let db = state.db.clone();
    let id = blocking(move || db.podcast_message_id())
        .await?
        .ok_or_else(|| ApiError::not_found("No se encontró el mensaje del podcast"))?;
    Ok(Json(json!({ "success": true, "podcastMessageId": id })))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::validation(format!("Campo inválido: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppStateInner;
    use crate::storage::MediaStorage;
    use crate::trackers::PresenceTracker;
    use async_trait::async_trait;
    use minerva_bot::moderator::{BotModerator, ModeratorConfig};
    use minerva_bot::persona::ProjectContext;
    use minerva_bot::provider::{ChatProvider, ProviderError};
    use minerva_db::Database;
    use std::sync::Arc;
    use std::time::Duration;

    struct SilentProvider;

    #[async_trait]
    impl ChatProvider for SilentProvider {
        async fn complete(
            &self,
            _system: Option<&str>,
            _user: &str,
        ) -> Result<String, ProviderError> {
            Err(ProviderError::Empty)
        }
    }

    async fn test_state() -> AppState {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let provider: Arc<dyn ChatProvider> = Arc::new(SilentProvider);
        let context = Arc::new(ProjectContext::default_context());
        let storage = MediaStorage::new(
            std::env::temp_dir().join(format!("minerva-api-test-{}", std::process::id())),
        )
        .await
        .unwrap();
        Arc::new(AppStateInner {
            moderator: BotModerator::new(
                db.clone(),
                provider.clone(),
                context.clone(),
                ModeratorConfig::default(),
            ),
            db,
            storage,
            typing: PresenceTracker::new(Duration::from_secs(5)),
            active: PresenceTracker::new(Duration::from_secs(30)),
            chat_provider: provider,
            project_context: context,
            chat_message_limit: 5,
        })
    }

    #[tokio::test]
    async fn podcast_id_is_not_found_until_seeded() {
        let state = test_state().await;

        let err = podcast_id(State(state.clone())).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let id = state
            .db
            .insert_message(&NewMessage {
                user_name: "Pozo Minerva".into(),
                user_colonia: "Información".into(),
                media_type: MediaKind::Audio,
                media_url: Some("/podcast/episodio-1.mp3".into()),
                ..Default::default()
            })
            .unwrap();

        let body = podcast_id(State(state)).await.unwrap();
        assert_eq!(body.0["podcastMessageId"], serde_json::json!(id));
        assert_eq!(body.0["success"], serde_json::json!(true));
    }
}
