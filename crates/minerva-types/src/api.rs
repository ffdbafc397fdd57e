use serde::{Deserialize, Serialize};

use crate::models::MediaKind;

// -- Response envelope --

/// Envelope shared by every API route: `{ success, data?, message?, error? }`.
///
/// Request bodies arrive camelCase (front-end convention); response payloads
/// keep the snake_case column names the clients already consume.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), message: None, error: None }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self { success: true, data: None, message: Some(message.into()), error: None }
    }

    pub fn failure(message: impl Into<String>, error: Option<String>) -> Self {
        Self { success: false, data: None, message: Some(message.into()), error }
    }
}

// -- Messages --

/// A chat message as served to clients, annotated with a one-level preview of
/// the message it replies to.
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub id: i64,
    pub user_name: String,
    pub user_colonia: String,
    pub message_text: Option<String>,
    pub media_type: MediaKind,
    pub media_url: Option<String>,
    pub media_filename: Option<String>,
    pub media_analysis: Option<String>,
    pub reply_to_id: Option<i64>,
    pub is_bot: bool,
    pub analyzed_by_bot: bool,
    pub created_at: String,
    pub reply_to_user_name: Option<String>,
    pub reply_to_message_text: Option<String>,
    pub reply_to_media_type: Option<MediaKind>,
}

// -- Reactions --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddReactionRequest {
    pub user_name: String,
    pub user_colonia: String,
    pub emoji: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveReactionRequest {
    pub user_name: String,
}

/// Aggregated reactions on one message, one group per emoji.
#[derive(Debug, Clone, Serialize)]
pub struct ReactionGroup {
    pub emoji: String,
    pub count: i64,
    pub users: Vec<String>,
}

// -- Presence --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRequest {
    pub user_name: String,
    pub user_colonia: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUser {
    pub user_name: String,
    pub user_colonia: String,
}

// -- Comments --

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub nombre: String,
    pub colonia: String,
    pub comentario: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    pub id: i64,
    pub nombre: String,
    pub colonia: String,
    pub comentario: String,
    pub likes: i64,
    pub created_at: String,
}

// -- FAQ chat --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub response: String,
    pub messages_remaining: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStatus {
    pub messages_used: i64,
    pub messages_remaining: i64,
    pub limit_reached: bool,
}

// -- Document library --

/// Static metadata for one official project document.
#[derive(Debug, Clone, Serialize)]
pub struct PdfDocument {
    pub id: u32,
    pub title: &'static str,
    pub filename: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    pub date: &'static str,
    pub size: &'static str,
    pub pages: &'static str,
}
