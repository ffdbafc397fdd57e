use std::sync::Arc;

use minerva_db::Database;
use tokio::task;
use tracing::{info, warn};

use crate::media::MediaAnalyzer;

/// One-shot sweep over multimedia messages whose analysis cache is empty,
/// run at startup before the server starts accepting traffic. Each row is
/// handled independently: a failed analysis is logged and skipped, never
/// blocking the rest of the sweep.
pub async fn run(db: Arc<Database>, analyzer: Arc<dyn MediaAnalyzer>) -> anyhow::Result<()> {
    let pending = {
        let db = Arc::clone(&db);
        task::spawn_blocking(move || db.media_missing_analysis()).await??
    };
    if pending.is_empty() {
        info!("media backfill: nothing pending");
        return Ok(());
    }
    info!("media backfill: {} message(s) pending analysis", pending.len());

    let mut filled = 0usize;
    for row in pending {
        // Uploaded files keep their stored filename; seeded media only has a
        // public URL path.
        let Some(file_ref) = row.media_filename.or(row.media_url) else {
            warn!("message {} has media type but no file reference", row.id);
            continue;
        };

        let analysis = analyzer.analyze(&file_ref, row.media_type).await;

        let db = Arc::clone(&db);
        let id = row.id;
        match task::spawn_blocking(move || db.set_media_analysis(id, &analysis)).await? {
            Ok(true) => filled += 1,
            Ok(false) => {}
            Err(e) => warn!("media backfill: storing analysis for {} failed: {}", id, e),
        }
    }

    info!("media backfill complete, {} analysis(es) stored", filled);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use minerva_db::models::NewMessage;
    use minerva_types::models::MediaKind;
    use std::sync::Mutex;

    struct RecordingAnalyzer {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MediaAnalyzer for RecordingAnalyzer {
        async fn analyze(&self, file_ref: &str, _kind: MediaKind) -> String {
            self.seen.lock().unwrap().push(file_ref.to_string());
            format!("descripción de {}", file_ref)
        }
    }

    #[tokio::test]
    async fn fills_only_empty_caches() {
        let db = Arc::new(Database::open_in_memory().unwrap());

        let pending = db
            .insert_message(&NewMessage {
                user_name: "Rosa".into(),
                user_colonia: "CSN-2".into(),
                media_type: MediaKind::Image,
                media_filename: Some("calle.jpg".into()),
                ..Default::default()
            })
            .unwrap();
        let already = db
            .insert_message(&NewMessage {
                user_name: "Rosa".into(),
                user_colonia: "CSN-2".into(),
                media_type: MediaKind::Audio,
                media_filename: Some("nota.mp3".into()),
                ..Default::default()
            })
            .unwrap();
        db.set_media_analysis(already, "ya transcrito").unwrap();

        let analyzer = Arc::new(RecordingAnalyzer {
            seen: Mutex::new(Vec::new()),
        });
        run(Arc::clone(&db), analyzer.clone()).await.unwrap();

        assert_eq!(*analyzer.seen.lock().unwrap(), vec!["calle.jpg".to_string()]);
        let filled = db.get_message(pending).unwrap().unwrap();
        assert_eq!(filled.media_analysis.as_deref(), Some("descripción de calle.jpg"));
        let untouched = db.get_message(already).unwrap().unwrap();
        assert_eq!(untouched.media_analysis.as_deref(), Some("ya transcrito"));
    }

    #[tokio::test]
    async fn empty_table_is_a_no_op() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let analyzer = Arc::new(RecordingAnalyzer {
            seen: Mutex::new(Vec::new()),
        });
        run(Arc::clone(&db), analyzer.clone()).await.unwrap();
        assert!(analyzer.seen.lock().unwrap().is_empty());
    }
}
