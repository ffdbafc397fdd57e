mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    routing::{delete, get, post, put},
};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use minerva_api::state::{AppState, AppStateInner};
use minerva_api::storage::MediaStorage;
use minerva_api::trackers::PresenceTracker;
use minerva_api::{chat, comments, messages, pdfs, presence, reactions};
use minerva_bot::media::GeminiAnalyzer;
use minerva_bot::moderator::{BotModerator, ModeratorConfig};
use minerva_bot::persona::ProjectContext;
use minerva_bot::provider::OpenAiChat;
use minerva_db::Database;

use crate::config::Config;

const TYPING_TTL: Duration = Duration::from_secs(5);
const ACTIVE_TTL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "minerva=debug,tower_http=debug".into()),
        )
        .init();

    let cfg = Config::from_env();
    if cfg.openai_api_key.is_empty() {
        warn!("OPENAI_API_KEY is empty; moderator and FAQ replies will fail");
    }
    if cfg.gemini_api_key.is_empty() {
        warn!("GEMINI_API_KEY is empty; media analysis will store placeholders");
    }

    let db = Arc::new(Database::open(&cfg.db_path)?);
    let storage = MediaStorage::new(cfg.uploads_dir.clone()).await?;
    let project_context = Arc::new(ProjectContext::load(&cfg.context_path));

    let chat_provider = Arc::new(OpenAiChat::new(
        cfg.openai_api_key.clone(),
        cfg.openai_base_url.clone(),
        cfg.openai_model.clone(),
        cfg.openai_temperature,
        cfg.openai_max_tokens,
    ));
    let analyzer = Arc::new(GeminiAnalyzer::new(
        cfg.gemini_api_key.clone(),
        cfg.gemini_model.clone(),
        cfg.uploads_dir.clone(),
        cfg.public_dir.clone(),
    ));

    // Fill missing multimedia analyses before taking traffic, so the first
    // moderation cycle sees as much context as possible.
    minerva_bot::backfill::run(db.clone(), analyzer.clone()).await?;

    let typing = PresenceTracker::new(TYPING_TTL);
    let active = PresenceTracker::new(ACTIVE_TTL);
    let _ = typing.spawn_sweep(Duration::from_secs(5));
    let _ = active.spawn_sweep(Duration::from_secs(10));

    let moderator = BotModerator::new(
        db.clone(),
        chat_provider.clone(),
        project_context.clone(),
        ModeratorConfig::default(),
    );
    let _ = moderator.spawn();

    // Expired FAQ sessions accumulate slowly; an hourly purge is plenty.
    {
        let db = db.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(3600));
            loop {
                interval.tick().await;
                let db = db.clone();
                match tokio::task::spawn_blocking(move || db.clean_expired_sessions()).await {
                    Ok(Ok(n)) if n > 0 => info!("purged {} expired chat session(s)", n),
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!("session cleanup failed: {}", e),
                    Err(e) => warn!("session cleanup task failed: {}", e),
                }
            }
        });
    }

    let state: AppState = Arc::new(AppStateInner {
        db,
        storage,
        typing,
        active,
        moderator,
        chat_provider,
        project_context,
        chat_message_limit: cfg.chat_message_limit,
    });

    let message_routes = Router::new()
        .route("/", get(messages::get_messages))
        .route("/", post(messages::create_message))
        .route("/since/{timestamp}", get(messages::get_since))
        .route("/bot/typing", get(messages::bot_typing))
        .route("/podcast/id", get(messages::podcast_id))
        .route("/typing/start", post(presence::typing_start))
        .route("/typing/stop", post(presence::typing_stop))
        .route("/typing", get(presence::typing_list))
        .route("/active/heartbeat", post(presence::active_heartbeat))
        .route("/active", get(presence::active_list))
        .route("/active/count", get(presence::active_count))
        .route("/{id}/reactions", get(reactions::get_reactions))
        .route("/{id}/reactions", post(reactions::add_reaction))
        .route("/{id}/reactions", delete(reactions::remove_reaction));

    let comment_routes = Router::new()
        .route("/", get(comments::list_comments))
        .route("/", post(comments::create_comment))
        .route("/{id}/like", put(comments::like_comment));

    let chat_routes = Router::new()
        .route("/", post(chat::ask))
        .route("/status/{session_id}", get(chat::status));

    let pdf_routes = Router::new()
        .route("/", get(pdfs::list))
        .route("/{id}", get(pdfs::by_id))
        .route("/category/{category}", get(pdfs::by_category));

    let app = Router::new()
        .route("/", get(index))
        .route("/api/health", get(health))
        .nest("/api/messages", message_routes)
        .nest("/api/comments", comment_routes)
        .nest("/api/chat", chat_routes)
        .nest("/api/pdfs", pdf_routes)
        .nest_service("/uploads", ServeDir::new(&cfg.uploads_dir))
        .nest_service("/public", ServeDir::new(&cfg.public_dir))
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port).parse()?;
    info!("Minerva server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn index() -> Json<serde_json::Value> {
    Json(json!({
        "success": true,
        "message": "API del proyecto Pozo de Minerva",
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "success": true, "status": "ok" }))
}

async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "message": "Ruta no encontrada" })),
    )
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
