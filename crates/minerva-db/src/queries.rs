use chrono::{DateTime, Duration, Utc};
use minerva_types::models::MediaKind;
use rusqlite::Connection;

use crate::models::{
    AnnotatedMessageRow, ChatSessionRow, CommentRow, MediaBackfillRow, MessageRow, NewMessage,
    ReactionGroupRow,
};
use crate::{Database, Result, StoreError, canonical_ts, now_ts};

const MESSAGE_COLS: &str = "m.id, m.user_name, m.user_colonia, m.message_text, m.media_type, \
     m.media_url, m.media_filename, m.media_analysis, m.reply_to_id, \
     m.is_bot, m.analyzed_by_bot, m.created_at";

impl Database {
    // -- Messages --

    /// Append a message. Rejects rows with neither text nor media, and rows
    /// replying to a message that does not exist. `created_at` is assigned
    /// here, never by the caller.
    pub fn insert_message(&self, new: &NewMessage) -> Result<i64> {
        self.insert_message_at(new, &now_ts())
    }

    pub(crate) fn insert_message_at(&self, new: &NewMessage, created_at: &str) -> Result<i64> {
        let text = new
            .message_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());

        if text.is_none() && new.media_type == MediaKind::None {
            return Err(StoreError::Validation(
                "message requires text or a media attachment".into(),
            ));
        }

        self.with_conn_mut(|conn| {
            if let Some(reply_to) = new.reply_to_id {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM messages WHERE id = ?1)",
                    [reply_to],
                    |row| row.get(0),
                )?;
                if !exists {
                    return Err(StoreError::Validation(format!(
                        "reply_to_id {} does not reference an existing message",
                        reply_to
                    )));
                }
            }

            conn.execute(
                "INSERT INTO messages
                 (user_name, user_colonia, message_text, media_type, media_url,
                  media_filename, reply_to_id, is_bot, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    new.user_name,
                    new.user_colonia,
                    text,
                    new.media_type.as_str(),
                    new.media_url,
                    new.media_filename,
                    new.reply_to_id,
                    new.is_bot,
                    created_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// The most recent `limit` messages in ascending chronological order,
    /// each annotated with a one-level preview of its reply target.
    pub fn get_recent(&self, limit: u32) -> Result<Vec<AnnotatedMessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLS}, r.user_name, r.message_text, r.media_type
                 FROM (SELECT * FROM messages
                       ORDER BY created_at DESC, id DESC LIMIT ?1) m
                 LEFT JOIN messages r ON m.reply_to_id = r.id
                 ORDER BY m.created_at ASC, m.id ASC"
            );
            query_annotated(conn, &sql, rusqlite::params![limit])
        })
    }

    /// All messages created strictly after `since`, ascending. The timestamp
    /// is re-rendered in the canonical format before comparison, so callers
    /// may echo back any RFC 3339 timestamp they have seen.
    pub fn get_since(&self, since: DateTime<Utc>) -> Result<Vec<AnnotatedMessageRow>> {
        let cutoff = canonical_ts(since);
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLS}, r.user_name, r.message_text, r.media_type
                 FROM messages m
                 LEFT JOIN messages r ON m.reply_to_id = r.id
                 WHERE m.created_at > ?1
                 ORDER BY m.created_at ASC, m.id ASC"
            );
            query_annotated(conn, &sql, rusqlite::params![cutoff])
        })
    }

    /// Non-bot messages inside the eligibility window that the moderator has
    /// not yet visited, ascending. Bounds the moderator's work per cycle;
    /// anything older than the window is never revisited.
    pub fn unanalyzed_recent(&self, window_secs: u64) -> Result<Vec<MessageRow>> {
        let cutoff = canonical_ts(Utc::now() - Duration::seconds(window_secs as i64));
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLS}
                 FROM messages m
                 WHERE m.analyzed_by_bot = 0
                   AND m.is_bot = 0
                   AND m.created_at >= ?1
                 ORDER BY m.created_at ASC, m.id ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![cutoff], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Idempotent: flags the given messages as visited by the moderator.
    /// Bot-authored rows are never flagged.
    pub fn mark_analyzed(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        self.with_conn_mut(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "UPDATE messages SET analyzed_by_bot = 1
                 WHERE is_bot = 0 AND id IN ({})",
                placeholders.join(", ")
            );
            let params: Vec<&dyn rusqlite::types::ToSql> =
                ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
            conn.execute(&sql, params.as_slice())?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {MESSAGE_COLS} FROM messages m WHERE m.id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_row([id], message_from_row).optional()
        })
    }

    /// One-shot fill of the multimedia analysis cache: only writes when the
    /// cache is still empty, so a computed analysis is never overwritten.
    pub fn set_media_analysis(&self, id: i64, analysis: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET media_analysis = ?1
                 WHERE id = ?2 AND (media_analysis IS NULL OR media_analysis = '')",
                rusqlite::params![analysis, id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Messages with media but no cached analysis, ascending. Backfill input.
    pub fn media_missing_analysis(&self) -> Result<Vec<MediaBackfillRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, media_type, media_url, media_filename
                 FROM messages
                 WHERE media_type != 'none'
                   AND (media_analysis IS NULL OR media_analysis = '')
                 ORDER BY created_at ASC, id ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(MediaBackfillRow {
                        id: row.get(0)?,
                        media_type: media_kind(row, 1)?,
                        media_url: row.get(2)?,
                        media_filename: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Id of the seeded podcast message, if present.
    pub fn podcast_message_id(&self) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id FROM messages
                 WHERE user_name = 'Pozo Minerva'
                   AND user_colonia = 'Información'
                   AND media_type = 'audio'
                 ORDER BY created_at ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
        })
    }

    // -- Reactions --

    /// Last-write-wins per (message, user): a second reaction from the same
    /// user replaces the emoji instead of adding a row.
    pub fn upsert_reaction(
        &self,
        message_id: i64,
        user_name: &str,
        user_colonia: &str,
        emoji: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO message_reactions
                 (message_id, user_name, user_colonia, emoji, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(message_id, user_name) DO UPDATE SET
                     emoji = excluded.emoji,
                     user_colonia = excluded.user_colonia,
                     created_at = excluded.created_at",
                rusqlite::params![message_id, user_name, user_colonia, emoji, now_ts()],
            )?;
            Ok(())
        })
    }

    /// No-op when the user has no reaction on the message.
    pub fn remove_reaction(&self, message_id: i64, user_name: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "DELETE FROM message_reactions WHERE message_id = ?1 AND user_name = ?2",
                rusqlite::params![message_id, user_name],
            )?;
            Ok(())
        })
    }

    /// Reactions on a message grouped by emoji, most popular first.
    pub fn reactions_by_message(&self, message_id: i64) -> Result<Vec<ReactionGroupRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT emoji, COUNT(*) AS count,
                        GROUP_CONCAT(user_name, ',') AS users
                 FROM message_reactions
                 WHERE message_id = ?1
                 GROUP BY emoji
                 ORDER BY count DESC, emoji ASC",
            )?;
            let rows = stmt
                .query_map([message_id], |row| {
                    let users: String = row.get(2)?;
                    Ok(ReactionGroupRow {
                        emoji: row.get(0)?,
                        count: row.get(1)?,
                        users: users.split(',').map(str::to_string).collect(),
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Comments --

    pub fn insert_comment(&self, nombre: &str, colonia: &str, comentario: &str) -> Result<CommentRow> {
        let id = self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO comments (nombre, colonia, comentario, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![nombre, colonia, comentario, now_ts()],
            )?;
            Ok(conn.last_insert_rowid())
        })?;

        self.get_comment(id)?
            .ok_or_else(|| StoreError::NotFound(format!("comment {} vanished after insert", id)))
    }

    pub fn list_comments(&self, limit: u32, offset: u32) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, nombre, colonia, comentario, likes, created_at
                 FROM comments
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?1 OFFSET ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![limit, offset], comment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_comments(&self) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM comments", [], |row| row.get(0))?)
        })
    }

    pub fn get_comment(&self, id: i64) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, nombre, colonia, comentario, likes, created_at
                 FROM comments WHERE id = ?1",
                [id],
                comment_from_row,
            )
            .optional()
        })
    }

    pub fn like_comment(&self, id: i64) -> Result<CommentRow> {
        let changed = self.with_conn_mut(|conn| {
            Ok(conn.execute("UPDATE comments SET likes = likes + 1 WHERE id = ?1", [id])?)
        })?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("comment {} not found", id)));
        }
        self.get_comment(id)?
            .ok_or_else(|| StoreError::NotFound(format!("comment {} not found", id)))
    }

    // -- FAQ chat sessions --

    /// Fetch the live session, resetting it when missing or expired.
    /// Sessions expire 24 hours after (re-)creation.
    pub fn get_or_create_session(&self, session_id: &str) -> Result<ChatSessionRow> {
        let now = now_ts();
        if let Some(row) = self.with_conn(|conn| {
            conn.query_row(
                "SELECT session_id, message_count, expires_at FROM chat_sessions
                 WHERE session_id = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                rusqlite::params![session_id, now],
                session_from_row,
            )
            .optional()
        })? {
            return Ok(row);
        }

        let expires_at = canonical_ts(Utc::now() + Duration::hours(24));
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO chat_sessions (session_id, message_count, expires_at)
                 VALUES (?1, 0, ?2)
                 ON CONFLICT(session_id) DO UPDATE SET
                     message_count = 0,
                     expires_at = excluded.expires_at",
                rusqlite::params![session_id, expires_at],
            )?;
            Ok(())
        })?;

        Ok(ChatSessionRow {
            session_id: session_id.to_string(),
            message_count: 0,
            expires_at: Some(expires_at),
        })
    }

    pub fn increment_session(&self, session_id: &str) -> Result<ChatSessionRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE chat_sessions SET message_count = message_count + 1
                 WHERE session_id = ?1",
                [session_id],
            )?;
            Ok(())
        })?;

        self.with_conn(|conn| {
            conn.query_row(
                "SELECT session_id, message_count, expires_at FROM chat_sessions
                 WHERE session_id = ?1",
                [session_id],
                session_from_row,
            )
            .optional()
        })?
        .ok_or_else(|| StoreError::NotFound(format!("chat session {} not found", session_id)))
    }

    pub fn clean_expired_sessions(&self) -> Result<usize> {
        self.with_conn_mut(|conn| {
            Ok(conn.execute(
                "DELETE FROM chat_sessions WHERE expires_at IS NOT NULL AND expires_at < ?1",
                [now_ts()],
            )?)
        })
    }
}

// -- Row mapping --

fn media_kind(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<MediaKind> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn media_kind_opt(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<MediaKind>> {
    match row.get::<_, Option<String>>(idx)? {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        }),
    }
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        user_name: row.get(1)?,
        user_colonia: row.get(2)?,
        message_text: row.get(3)?,
        media_type: media_kind(row, 4)?,
        media_url: row.get(5)?,
        media_filename: row.get(6)?,
        media_analysis: row.get(7)?,
        reply_to_id: row.get(8)?,
        is_bot: row.get(9)?,
        analyzed_by_bot: row.get(10)?,
        created_at: row.get(11)?,
    })
}

fn comment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        nombre: row.get(1)?,
        colonia: row.get(2)?,
        comentario: row.get(3)?,
        likes: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn session_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatSessionRow> {
    Ok(ChatSessionRow {
        session_id: row.get(0)?,
        message_count: row.get(1)?,
        expires_at: row.get(2)?,
    })
}

fn query_annotated(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> Result<Vec<AnnotatedMessageRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |row| {
            Ok(AnnotatedMessageRow {
                message: message_from_row(row)?,
                reply_to_user_name: row.get(12)?,
                reply_to_message_text: row.get(13)?,
                reply_to_media_type: media_kind_opt(row, 14)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn text_message(text: &str) -> NewMessage {
        NewMessage {
            user_name: "Ana".into(),
            user_colonia: "CSN-2".into(),
            message_text: Some(text.into()),
            ..Default::default()
        }
    }

    #[test]
    fn rejects_message_without_text_or_media() {
        let db = db();
        let err = db.insert_message(&text_message("   ")).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn accepts_media_only_message() {
        let db = db();
        let id = db
            .insert_message(&NewMessage {
                user_name: "Ana".into(),
                user_colonia: "CSN-2".into(),
                media_type: MediaKind::Image,
                media_url: Some("/uploads/foto.jpg".into()),
                media_filename: Some("foto.jpg".into()),
                ..Default::default()
            })
            .unwrap();
        let row = db.get_message(id).unwrap().unwrap();
        assert_eq!(row.media_type, MediaKind::Image);
        assert!(row.message_text.is_none());
    }

    #[test]
    fn rejects_dangling_reply_reference() {
        let db = db();
        let mut msg = text_message("hola");
        msg.reply_to_id = Some(999);
        let err = db.insert_message(&msg).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn since_is_strict_and_ordered() {
        let db = db();
        let t1 = "2025-06-01T10:00:00.000000Z";
        let t2 = "2025-06-01T10:00:01.000000Z";
        let t3 = "2025-06-01T10:00:02.000000Z";
        db.insert_message_at(&text_message("uno"), t1).unwrap();
        db.insert_message_at(&text_message("dos"), t2).unwrap();
        db.insert_message_at(&text_message("tres"), t3).unwrap();

        let after_t1 = db.get_since(t1.parse().unwrap()).unwrap();
        let texts: Vec<_> = after_t1
            .iter()
            .map(|m| m.message.message_text.clone().unwrap())
            .collect();
        assert_eq!(texts, vec!["dos", "tres"]);

        let after_t2 = db.get_since(t2.parse().unwrap()).unwrap();
        assert_eq!(after_t2.len(), 1);
        assert_eq!(after_t2[0].message.message_text.as_deref(), Some("tres"));

        let after_t3 = db.get_since(t3.parse().unwrap()).unwrap();
        assert!(after_t3.is_empty());
    }

    #[test]
    fn recent_returns_newest_window_ascending() {
        let db = db();
        for i in 0..5 {
            let ts = format!("2025-06-01T10:00:0{}.000000Z", i);
            db.insert_message_at(&text_message(&format!("m{}", i)), &ts)
                .unwrap();
        }
        let recent = db.get_recent(3).unwrap();
        let texts: Vec<_> = recent
            .iter()
            .map(|m| m.message.message_text.clone().unwrap())
            .collect();
        assert_eq!(texts, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn recent_annotates_reply_preview() {
        let db = db();
        let parent = db.insert_message(&text_message("pregunta original")).unwrap();
        let mut reply = text_message("respuesta");
        reply.reply_to_id = Some(parent);
        db.insert_message(&reply).unwrap();

        let rows = db.get_recent(10).unwrap();
        let annotated = rows.last().unwrap();
        assert_eq!(annotated.message.reply_to_id, Some(parent));
        assert_eq!(annotated.reply_to_user_name.as_deref(), Some("Ana"));
        assert_eq!(
            annotated.reply_to_message_text.as_deref(),
            Some("pregunta original")
        );
        assert_eq!(annotated.reply_to_media_type, Some(MediaKind::None));
    }

    #[test]
    fn unanalyzed_recent_respects_window_and_flags() {
        let db = db();
        let stale = canonical_ts(Utc::now() - Duration::seconds(120));
        db.insert_message_at(&text_message("viejo"), &stale).unwrap();
        let fresh_id = db.insert_message(&text_message("nuevo")).unwrap();
        let mut bot = text_message("bot");
        bot.is_bot = true;
        db.insert_message(&bot).unwrap();

        let pending = db.unanalyzed_recent(60).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, fresh_id);

        db.mark_analyzed(&[fresh_id]).unwrap();
        assert!(db.unanalyzed_recent(60).unwrap().is_empty());

        // marking again is a no-op
        db.mark_analyzed(&[fresh_id]).unwrap();
        assert!(db.unanalyzed_recent(60).unwrap().is_empty());
    }

    #[test]
    fn media_analysis_fills_only_once() {
        let db = db();
        let id = db
            .insert_message(&NewMessage {
                user_name: "Ana".into(),
                user_colonia: "CSN-2".into(),
                media_type: MediaKind::Audio,
                media_filename: Some("nota.mp3".into()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(db.media_missing_analysis().unwrap().len(), 1);
        assert!(db.set_media_analysis(id, "transcripción").unwrap());
        assert!(!db.set_media_analysis(id, "otra cosa").unwrap());
        assert_eq!(
            db.get_message(id).unwrap().unwrap().media_analysis.as_deref(),
            Some("transcripción")
        );
        assert!(db.media_missing_analysis().unwrap().is_empty());
    }

    #[test]
    fn reaction_upsert_is_last_write_wins() {
        let db = db();
        let id = db.insert_message(&text_message("hola")).unwrap();

        db.upsert_reaction(id, "Luis", "Montserrat", "👍").unwrap();
        db.upsert_reaction(id, "Luis", "Montserrat", "👍").unwrap();
        let groups = db.reactions_by_message(id).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].count, 1);
        assert_eq!(groups[0].users, vec!["Luis".to_string()]);

        // switching emoji moves the user, total authors unchanged
        db.upsert_reaction(id, "Luis", "Montserrat", "❤️").unwrap();
        let groups = db.reactions_by_message(id).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].emoji, "❤️");
        assert_eq!(groups[0].count, 1);
    }

    #[test]
    fn reaction_remove_is_tolerant() {
        let db = db();
        let id = db.insert_message(&text_message("hola")).unwrap();
        db.remove_reaction(id, "nadie").unwrap();

        db.upsert_reaction(id, "Luis", "Montserrat", "👍").unwrap();
        db.remove_reaction(id, "Luis").unwrap();
        assert!(db.reactions_by_message(id).unwrap().is_empty());
    }

    #[test]
    fn comment_likes_increment_and_missing_id_errors() {
        let db = db();
        let comment = db.insert_comment("Ana", "CSN-1", "No estoy de acuerdo").unwrap();
        assert_eq!(comment.likes, 0);

        let liked = db.like_comment(comment.id).unwrap();
        assert_eq!(liked.likes, 1);

        let err = db.like_comment(9999).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn chat_session_counts_and_resets() {
        let db = db();
        let s = db.get_or_create_session("abc").unwrap();
        assert_eq!(s.message_count, 0);

        db.increment_session("abc").unwrap();
        let s = db.increment_session("abc").unwrap();
        assert_eq!(s.message_count, 2);

        // same session again keeps its count
        let s = db.get_or_create_session("abc").unwrap();
        assert_eq!(s.message_count, 2);
    }
}
