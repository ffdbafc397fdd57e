use crate::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS messages (
            id               INTEGER PRIMARY KEY AUTOINCREMENT,
            user_name        TEXT NOT NULL,
            user_colonia     TEXT NOT NULL,
            message_text     TEXT,
            media_type       TEXT NOT NULL DEFAULT 'none',
            media_url        TEXT,
            media_filename   TEXT,
            media_analysis   TEXT,
            reply_to_id      INTEGER REFERENCES messages(id),
            is_bot           INTEGER NOT NULL DEFAULT 0,
            analyzed_by_bot  INTEGER NOT NULL DEFAULT 0,
            created_at       TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_created
            ON messages(created_at);

        CREATE INDEX IF NOT EXISTS idx_messages_unanalyzed
            ON messages(analyzed_by_bot, is_bot, created_at);

        CREATE TABLE IF NOT EXISTS message_reactions (
            message_id   INTEGER NOT NULL REFERENCES messages(id),
            user_name    TEXT NOT NULL,
            user_colonia TEXT NOT NULL,
            emoji        TEXT NOT NULL,
            created_at   TEXT NOT NULL,
            PRIMARY KEY (message_id, user_name)
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_message
            ON message_reactions(message_id);

        CREATE TABLE IF NOT EXISTS comments (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            nombre      TEXT NOT NULL,
            colonia     TEXT NOT NULL,
            comentario  TEXT NOT NULL,
            likes       INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chat_sessions (
            session_id     TEXT PRIMARY KEY,
            message_count  INTEGER NOT NULL DEFAULT 0,
            expires_at     TEXT
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
