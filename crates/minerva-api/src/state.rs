use std::sync::Arc;

use minerva_bot::moderator::BotModerator;
use minerva_bot::persona::ProjectContext;
use minerva_bot::provider::ChatProvider;
use minerva_db::Database;

use crate::storage::MediaStorage;
use crate::trackers::PresenceTracker;

pub type AppState = Arc<AppStateInner>;

/// Shared state handed to every route handler.
pub struct AppStateInner {
    pub db: Arc<Database>,
    pub storage: MediaStorage,
    pub typing: Arc<PresenceTracker>,
    pub active: Arc<PresenceTracker>,
    pub moderator: Arc<BotModerator>,
    pub chat_provider: Arc<dyn ChatProvider>,
    pub project_context: Arc<ProjectContext>,
    /// Per-session daily question cap for the FAQ chatbot.
    pub chat_message_limit: i64,
}
