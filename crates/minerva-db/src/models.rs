/// Database row types — these map directly to SQLite rows.
/// Distinct from the minerva-types API models to keep the DB layer independent.
use minerva_types::models::MediaKind;

#[derive(Debug, Clone)]
pub struct MessageRow {
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
}

/// A message plus the one-level preview of its reply target, as produced by
/// the self LEFT JOIN in `get_recent`/`get_since`.
#[derive(Debug, Clone)]
pub struct AnnotatedMessageRow {
    pub message: MessageRow,
    pub reply_to_user_name: Option<String>,
    pub reply_to_message_text: Option<String>,
    pub reply_to_media_type: Option<MediaKind>,
}

/// Fields supplied by the caller when appending a message; `created_at` is
/// always assigned server-side.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub user_name: String,
    pub user_colonia: String,
    pub message_text: Option<String>,
    pub media_type: MediaKind,
    pub media_url: Option<String>,
    pub media_filename: Option<String>,
    pub reply_to_id: Option<i64>,
    pub is_bot: bool,
}

#[derive(Debug, Clone)]
pub struct ReactionGroupRow {
    pub emoji: String,
    pub count: i64,
    pub users: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CommentRow {
    pub id: i64,
    pub nombre: String,
    pub colonia: String,
    pub comentario: String,
    pub likes: i64,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ChatSessionRow {
    pub session_id: String,
    pub message_count: i64,
    pub expires_at: Option<String>,
}

/// Subset of message columns the backfill sweep needs.
#[derive(Debug, Clone)]
pub struct MediaBackfillRow {
    pub id: i64,
    pub media_type: MediaKind,
    pub media_url: Option<String>,
    pub media_filename: Option<String>,
}
