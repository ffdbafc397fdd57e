use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use minerva_db::Database;
use minerva_db::models::{AnnotatedMessageRow, MessageRow, NewMessage};
use minerva_types::models::MediaKind;
use tokio::task;
use tracing::{debug, info, warn};

use crate::persona::{BOT_COLONIA, BOT_NAME, NO_RESPONSE_SENTINEL, ProjectContext, SYSTEM_PROMPT};
use crate::provider::ChatProvider;

/// Rendered in place of a multimedia analysis the backfill has not reached.
const ANALYSIS_PENDING: &str = "[contenido multimedia aún no analizado]";

/// Timing and sizing knobs of the moderation loop. The three durations are
/// the only constants that affect correctness.
#[derive(Debug, Clone)]
pub struct ModeratorConfig {
    /// How often a moderation cycle fires.
    pub cycle_period: Duration,
    /// Lookback bounding which unanalyzed messages a cycle will consider.
    pub eligibility_window_secs: u64,
    /// How long the typing indicator stays visible after a cycle, so
    /// clients polling it get a chance to render it.
    pub grace_delay: Duration,
    /// Size of the shared recent-conversation window.
    pub recent_window: u32,
    /// Maximum reply-chain ancestors resolved per new message.
    pub max_reply_depth: usize,
}

impl Default for ModeratorConfig {
    fn default() -> Self {
        Self {
            cycle_period: Duration::from_secs(30),
            eligibility_window_secs: 60,
            grace_delay: Duration::from_secs(3),
            recent_window: 20,
            max_reply_depth: 5,
        }
    }
}

/// Periodic group-chat moderator. Polls for unanalyzed messages, builds
/// conversational context, asks the language model whether to respond, and
/// appends a bot-authored reply when it does.
///
/// At most one cycle runs at a time: a cycle firing while another is still
/// analyzing is skipped outright, never queued.
pub struct BotModerator {
    db: Arc<Database>,
    provider: Arc<dyn ChatProvider>,
    context: Arc<ProjectContext>,
    /// Client-visible "bot is typing" flag; held through the grace delay.
    analyzing: Arc<AtomicBool>,
    /// Claimed for the whole duration of a cycle, including the poll. Kept
    /// separate from `analyzing` so an empty poll never flickers the typing
    /// indicator on.
    cycle_claimed: AtomicBool,
    cfg: ModeratorConfig,
}

impl BotModerator {
    pub fn new(
        db: Arc<Database>,
        provider: Arc<dyn ChatProvider>,
        context: Arc<ProjectContext>,
        cfg: ModeratorConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            db,
            provider,
            context,
            analyzing: Arc::new(AtomicBool::new(false)),
            cycle_claimed: AtomicBool::new(false),
            cfg,
        })
    }

    /// Whether the "bot is typing" indicator should show.
    pub fn is_typing(&self) -> bool {
        self.analyzing.load(Ordering::Acquire)
    }

    /// Start the periodic moderation loop. The first cycle runs immediately.
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        info!(
            "moderator started, cycle every {:?}",
            this.cfg.cycle_period
        );
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.cfg.cycle_period);
            loop {
                interval.tick().await;
                if let Err(e) = this.run_cycle().await {
                    warn!("moderation cycle failed: {:#}", e);
                }
            }
        })
    }

    /// One moderation cycle. An empty poll keeps the moderator idle and
    /// performs no visible work; a busy moderator skips the cycle entirely,
    /// never queues it. The claim is taken before the poll so two callers
    /// racing into the same cycle cannot both reach the provider.
    pub async fn run_cycle(&self) -> anyhow::Result<()> {
        if self.analyzing.load(Ordering::Acquire) {
            debug!("moderator still busy, skipping cycle");
            return Ok(());
        }
        if self
            .cycle_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("moderation cycle already in flight, skipping");
            return Ok(());
        }

        let result = self.cycle().await;
        self.cycle_claimed.store(false, Ordering::Release);
        result
    }

    async fn cycle(&self) -> anyhow::Result<()> {
        let db = Arc::clone(&self.db);
        let window = self.cfg.eligibility_window_secs;
        let fresh = task::spawn_blocking(move || db.unanalyzed_recent(window)).await??;
        if fresh.is_empty() {
            return Ok(());
        }

        self.analyzing.store(true, Ordering::Release);
        info!("moderator analyzing {} new message(s)", fresh.len());

        let result = self.analyze(fresh).await;

        // Keep the typing indicator visible through the grace delay so even
        // fast cycles can be observed by polling clients.
        let flag = Arc::clone(&self.analyzing);
        let grace = self.cfg.grace_delay;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            flag.store(false, Ordering::Release);
        });

        result
    }

    async fn analyze(&self, fresh: Vec<MessageRow>) -> anyhow::Result<()> {
        let db = Arc::clone(&self.db);
        let recent_window = self.cfg.recent_window;
        let max_depth = self.cfg.max_reply_depth;
        let fresh_for_render = fresh.clone();

        let (recent_block, new_block) = task::spawn_blocking(move || {
            let recent = db.get_recent(recent_window)?;
            let recent_block = render_recent_window(&recent);
            let blocks = fresh_for_render
                .iter()
                .map(|m| render_with_ancestry(&db, m, max_depth))
                .collect::<minerva_db::Result<Vec<_>>>()?;
            Ok::<_, minerva_db::StoreError>((recent_block, blocks.join("\n\n")))
        })
        .await??;

        let prompt = build_prompt(self.context.as_str(), &recent_block, &new_block, fresh.len());

        // Provider failures abort the cycle, but the messages are still
        // marked analyzed below: at-most-once, no retry storms.
        let reply = match self.provider.complete(None, &prompt).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("provider call failed, cycle aborted: {}", e);
                None
            }
        };

        let ids: Vec<i64> = fresh.iter().map(|m| m.id).collect();
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || db.mark_analyzed(&ids)).await??;

        let Some(reply) = reply else {
            return Ok(());
        };
        let reply = reply.trim().to_string();
        if reply.is_empty() || reply == NO_RESPONSE_SENTINEL {
            info!("moderator chose not to respond");
            return Ok(());
        }

        // Anchor the reply to the newest message of the cycle so it stays
        // visually attached even when several unrelated messages arrived.
        let anchor = fresh.last().map(|m| m.id);
        let bot_message = NewMessage {
            user_name: BOT_NAME.to_string(),
            user_colonia: BOT_COLONIA.to_string(),
            message_text: Some(reply),
            reply_to_id: anchor,
            is_bot: true,
            ..Default::default()
        };
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || db.insert_message(&bot_message)).await??;
        info!("moderator replied in the group chat");
        Ok(())
    }
}

// -- Context rendering --

fn media_label(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "Imagen adjunta",
        MediaKind::Audio => "Audio adjunto",
        MediaKind::Video => "Video adjunto",
        MediaKind::None => "",
    }
}

/// Full rendering of one message: body text plus the cached multimedia
/// analysis (or a pending placeholder), labeled by media kind.
fn render_enriched(m: &MessageRow) -> String {
    let mut out = format!(
        "[{} ({})]: {}",
        m.user_name,
        m.user_colonia,
        m.message_text.as_deref().unwrap_or("[archivo multimedia]")
    );
    if m.media_type != MediaKind::None {
        let analysis = m
            .media_analysis
            .as_deref()
            .filter(|a| !a.is_empty())
            .unwrap_or(ANALYSIS_PENDING);
        out.push_str(&format!("\n  [{}: {}]", media_label(m.media_type), analysis));
    }
    out
}

/// Enriched rendering plus the message's reply-chain ancestry, resolved via
/// bounded point lookups and appended oldest ancestor first.
pub(crate) fn render_with_ancestry(
    db: &Database,
    m: &MessageRow,
    max_depth: usize,
) -> minerva_db::Result<String> {
    let mut out = render_enriched(m);

    let mut ancestors = Vec::new();
    let mut next = m.reply_to_id;
    while let Some(id) = next {
        if ancestors.len() >= max_depth {
            break;
        }
        let Some(parent) = db.get_message(id)? else {
            break;
        };
        next = parent.reply_to_id;
        ancestors.push(parent);
    }

    if !ancestors.is_empty() {
        out.push_str("\n  Hilo al que responde (del más antiguo al más reciente):");
        for ancestor in ancestors.iter().rev() {
            out.push_str("\n    ");
            out.push_str(&render_enriched(ancestor).replace('\n', "\n    "));
        }
    }
    Ok(out)
}

/// Cheap rendering of the shared recent window: text, a bare media tag, and a
/// one-line mention of the reply target. Conversational flow only.
pub(crate) fn render_recent_window(rows: &[AnnotatedMessageRow]) -> String {
    rows.iter()
        .map(|row| {
            let m = &row.message;
            let mut line = format!(
                "[{} ({})]: {}",
                m.user_name,
                m.user_colonia,
                m.message_text.as_deref().unwrap_or("[archivo multimedia]")
            );
            if m.media_type != MediaKind::None {
                line.push_str(&format!(" [{}]", m.media_type.as_str()));
            }
            if let Some(who) = &row.reply_to_user_name {
                line.push_str(&format!(" (en respuesta a {})", who));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_prompt(context: &str, recent_block: &str, new_block: &str, count: usize) -> String {
    format!(
        "{SYSTEM_PROMPT}\n\n\
         CONTEXTO DEL PROYECTO (información oficial):\n\n{context}\n\n---\n\n\
         CONVERSACIÓN RECIENTE EN EL CHAT GRUPAL:\n\n{recent_block}\n\n---\n\n\
         NUEVOS MENSAJES EN EL CHAT GRUPAL:\n\n{new_block}\n\n---\n\n\
         INSTRUCCIONES:\n\
         Has detectado {count} mensaje(s) nuevo(s) en el chat grupal comunitario.\n\n\
         DEBES RESPONDER a cualquier pregunta sobre el proyecto del Pozo de Minerva, incluyendo:\n\
         - Preguntas sobre ubicación, colonias afectadas, costos, plazos\n\
         - Preguntas sobre impacto ambiental, permisos, aspectos legales\n\
         - Dudas sobre procedimientos, contratación, o aspectos técnicos\n\
         - Menciones de rumores o información incorrecta\n\n\
         SOLO NO respondas si:\n\
         - Son saludos simples (\"hola\", \"buenos días\") sin preguntas\n\
         - Son conversaciones personales entre vecinos sin relación al proyecto\n\
         - Son comentarios de opinión SIN preguntas\n\n\
         Si decides NO responder, di exactamente: \"{NO_RESPONSE_SENTINEL}\"\n\n\
         Si decides responder, escribe tu mensaje siguiendo estas reglas:\n\
         - Máximo 2-3 párrafos cortos\n\
         - Tono moderador y crítico\n\
         - Usa \"supuestamente\" para información oficial\n\
         - Menciona al menos uno de los 5 puntos de preocupación\n\
         - Sé directo y sin rodeos\n\
         - Responde SIEMPRE las preguntas directas"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    struct ScriptedProvider {
        reply: String,
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                calls: AtomicUsize::new(0),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedProvider {
        async fn complete(&self, _system: Option<&str>, user: &str) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(user.to_string());
            Ok(self.reply.clone())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl ChatProvider for FailingProvider {
        async fn complete(&self, _system: Option<&str>, _user: &str) -> Result<String, ProviderError> {
            Err(ProviderError::Empty)
        }
    }

    /// Blocks inside the provider call until released by the test.
    struct GatedProvider {
        gate: Arc<Notify>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatProvider for GatedProvider {
        async fn complete(&self, _system: Option<&str>, _user: &str) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok("respuesta tardía".to_string())
        }
    }

    fn test_db() -> Arc<Database> {
        Arc::new(Database::open_in_memory().unwrap())
    }

    fn user_message(text: &str) -> NewMessage {
        NewMessage {
            user_name: "Vecina".to_string(),
            user_colonia: "CSN-1".to_string(),
            message_text: Some(text.to_string()),
            ..Default::default()
        }
    }

    fn moderator(db: &Arc<Database>, provider: Arc<dyn ChatProvider>) -> Arc<BotModerator> {
        BotModerator::new(
            Arc::clone(db),
            provider,
            Arc::new(ProjectContext::default_context()),
            ModeratorConfig::default(),
        )
    }

    fn bot_messages(db: &Database) -> Vec<MessageRow> {
        db.get_recent(100)
            .unwrap()
            .into_iter()
            .map(|r| r.message)
            .filter(|m| m.is_bot)
            .collect()
    }

    #[tokio::test]
    async fn empty_poll_keeps_moderator_idle() {
        let db = test_db();
        let provider = ScriptedProvider::new("algo");
        let m = moderator(&db, provider.clone());

        m.run_cycle().await.unwrap();

        assert!(!m.is_typing());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_replies_anchored_to_last_new_message() {
        let db = test_db();
        let provider =
            ScriptedProvider::new("Según la municipalidad, supuestamente serán ~11,650 personas.");
        let m = moderator(&db, provider.clone());

        let id = db
            .insert_message(&user_message("¿Cuánta gente se verá afectada?"))
            .unwrap();

        m.run_cycle().await.unwrap();

        let bots = bot_messages(&db);
        assert_eq!(bots.len(), 1);
        assert_eq!(bots[0].reply_to_id, Some(id));
        assert!(bots[0].is_bot);
        assert_eq!(bots[0].user_name, BOT_NAME);

        // typing indicator stays up through the grace delay, then drops
        assert!(m.is_typing());
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(!m.is_typing());

        // the question reached the provider
        let prompts = provider.prompts.lock().unwrap();
        assert!(prompts[0].contains("¿Cuánta gente se verá afectada?"));
    }

    #[tokio::test(start_paused = true)]
    async fn sentinel_suppresses_reply_but_marks_analyzed() {
        let db = test_db();
        let m = moderator(&db, ScriptedProvider::new(NO_RESPONSE_SENTINEL));

        db.insert_message(&user_message("hola buenos días")).unwrap();
        m.run_cycle().await.unwrap();

        assert!(bot_messages(&db).is_empty());
        assert!(db.unanalyzed_recent(60).unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn provider_failure_still_marks_analyzed() {
        let db = test_db();
        let m = moderator(&db, Arc::new(FailingProvider));

        db.insert_message(&user_message("¿Dónde será el pozo?")).unwrap();
        m.run_cycle().await.unwrap();

        assert!(bot_messages(&db).is_empty());
        // never revisited: the failed message is permanently skipped
        assert!(db.unanalyzed_recent(60).unwrap().is_empty());
    }

    #[tokio::test]
    async fn busy_moderator_skips_overlapping_cycle() {
        let db = test_db();
        let gate = Arc::new(Notify::new());
        let provider = Arc::new(GatedProvider {
            gate: Arc::clone(&gate),
            calls: AtomicUsize::new(0),
        });
        let m = moderator(&db, provider.clone());

        db.insert_message(&user_message("¿Ya hay permisos del MSPAS?"))
            .unwrap();

        let first = {
            let m = Arc::clone(&m);
            tokio::spawn(async move { m.run_cycle().await })
        };
        while !m.is_typing() {
            tokio::task::yield_now().await;
        }

        // second cycle fires while the first is mid-provider-call
        m.run_cycle().await.unwrap();

        gate.notify_one();
        first.await.unwrap().unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(bot_messages(&db).len(), 1);
    }

    #[tokio::test]
    async fn racing_cycle_entries_claim_a_single_cycle() {
        let db = test_db();
        let provider = ScriptedProvider::new("Según la municipalidad, supuestamente en 2025.");
        let m = moderator(&db, provider.clone());

        db.insert_message(&user_message("¿Cuándo inician los trabajos?"))
            .unwrap();

        // both callers enter before either poll resolves; only one may
        // reach the provider
        let (a, b) = tokio::join!(m.run_cycle(), m.run_cycle());
        a.unwrap();
        b.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(bot_messages(&db).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recent_window_and_enrichment_reach_the_prompt() {
        let db = test_db();
        let provider = ScriptedProvider::new(NO_RESPONSE_SENTINEL);
        let m = moderator(&db, provider.clone());

        let with_media = NewMessage {
            user_name: "Luis".to_string(),
            user_colonia: "Montserrat".to_string(),
            message_text: Some("miren esta foto de la obra".to_string()),
            media_type: MediaKind::Image,
            media_filename: Some("obra.jpg".to_string()),
            ..Default::default()
        };
        let id = db.insert_message(&with_media).unwrap();
        db.set_media_analysis(id, "Maquinaria pesada junto al bulevar")
            .unwrap();

        m.run_cycle().await.unwrap();

        let prompts = provider.prompts.lock().unwrap();
        assert!(prompts[0].contains("Maquinaria pesada junto al bulevar"));
        assert!(prompts[0].contains("CONVERSACIÓN RECIENTE"));
    }

    #[test]
    fn ancestry_resolution_stops_at_five_levels() {
        let db = test_db();

        let mut prev = None;
        let mut last = None;
        for i in 0..7 {
            let mut msg = user_message(&format!("eslabón c{}", i));
            msg.reply_to_id = prev;
            let id = db.insert_message(&msg).unwrap();
            prev = Some(id);
            last = Some(id);
        }

        let tip = db.get_message(last.unwrap()).unwrap().unwrap();
        let rendered = render_with_ancestry(&db, &tip, 5).unwrap();

        // c5..c1 appear as ancestry, c0 is beyond the depth bound
        for i in 1..=5 {
            assert!(rendered.contains(&format!("eslabón c{}", i)));
        }
        assert!(!rendered.contains("eslabón c0"));
    }

    #[test]
    fn pending_analysis_uses_placeholder() {
        let row = MessageRow {
            id: 1,
            user_name: "Ana".into(),
            user_colonia: "CSN-3".into(),
            message_text: None,
            media_type: MediaKind::Audio,
            media_url: None,
            media_filename: Some("nota.mp3".into()),
            media_analysis: None,
            reply_to_id: None,
            is_bot: false,
            analyzed_by_bot: false,
            created_at: "2025-06-01T10:00:00.000000Z".into(),
        };
        let rendered = render_enriched(&row);
        assert!(rendered.contains(ANALYSIS_PENDING));
        assert!(rendered.contains("Audio adjunto"));
    }
}
