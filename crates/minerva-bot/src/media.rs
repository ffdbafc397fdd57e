use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use minerva_types::models::MediaKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::provider::ProviderError;

// Placeholder sentinels persisted in place of a real analysis. The pipeline
// never fails a message write or a moderation cycle because analysis failed.
pub const IMAGE_FAILED: &str = "[Imagen - no se pudo analizar]";
pub const VIDEO_FAILED: &str = "[Video - no se pudo analizar]";
pub const AUDIO_FAILED: &str = "[Audio - no se pudo transcribir]";
pub const FILE_MISSING: &str = "[Archivo multimedia no encontrado]";
pub const UNSUPPORTED: &str = "[Tipo de multimedia no soportado]";

const IMAGE_PROMPT: &str = "Describe esta imagen de manera detallada y clara. \
    Incluye qué objetos, personas o lugares puedes identificar, \
    qué está sucediendo en la imagen, el contexto y cualquier detalle relevante. \
    Responde en español.";

const VIDEO_PROMPT: &str = "Describe este video de manera detallada. \
    Incluye qué está sucediendo, quiénes aparecen, qué acciones se realizan, \
    el contexto del video y cualquier detalle importante que puedas observar. \
    Responde en español.";

const AUDIO_PROMPT: &str = "Transcribe este audio de manera precisa. \
    Incluye todo lo que se dice en el audio, manteniendo el orden y contexto. \
    Si hay múltiples voces, indica cuando cambia el hablante si es posible. \
    Responde en español.";

/// Stateless adapter from a media file to a textual description/transcript.
/// Infallible by contract: failures yield placeholder text, never errors.
#[async_trait]
pub trait MediaAnalyzer: Send + Sync {
    async fn analyze(&self, file_ref: &str, kind: MediaKind) -> String;
}

/// Gemini multimodal client. Files are sent inline as base64.
pub struct GeminiAnalyzer {
    http: reqwest::Client,
    api_key: String,
    model: String,
    uploads_dir: PathBuf,
    public_dir: PathBuf,
}

impl GeminiAnalyzer {
    pub fn new(api_key: String, model: String, uploads_dir: PathBuf, public_dir: PathBuf) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            model,
            uploads_dir,
            public_dir,
        }
    }

    /// References starting with '/' point into the public static tree
    /// (seeded files like the podcast); bare filenames live in uploads.
    fn resolve(&self, file_ref: &str) -> PathBuf {
        if let Some(rel) = file_ref.strip_prefix('/') {
            self.public_dir.join(rel)
        } else {
            self.uploads_dir.join(file_ref)
        }
    }

    async fn generate(
        &self,
        prompt: &str,
        mime: &str,
        data: &[u8],
    ) -> Result<String, ProviderError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let body = serde_json::json!({
            "contents": [{
                "parts": [
                    { "text": prompt },
                    { "inline_data": { "mime_type": mime, "data": B64.encode(data) } }
                ]
            }]
        });

        let resp = self.http.post(url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, body });
        }

        let payload: serde_json::Value = resp.json().await?;
        let text = payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or(ProviderError::Empty)?;
        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl MediaAnalyzer for GeminiAnalyzer {
    async fn analyze(&self, file_ref: &str, kind: MediaKind) -> String {
        let prompt = match kind {
            MediaKind::Image => IMAGE_PROMPT,
            MediaKind::Video => VIDEO_PROMPT,
            MediaKind::Audio => AUDIO_PROMPT,
            MediaKind::None => return UNSUPPORTED.to_string(),
        };

        let path = self.resolve(file_ref);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) => {
                warn!("media file {} unreadable: {}", path.display(), e);
                return FILE_MISSING.to_string();
            }
        };

        let mime = mime_for(kind, &path);
        match self.generate(prompt, mime, &data).await {
            Ok(text) => {
                info!("analyzed {} {}", kind, file_ref);
                text
            }
            Err(e) => {
                warn!("analysis of {} {} failed: {}", kind, file_ref, e);
                failure_placeholder(kind)
            }
        }
    }
}

pub fn failure_placeholder(kind: MediaKind) -> String {
    match kind {
        MediaKind::Image => IMAGE_FAILED,
        MediaKind::Video => VIDEO_FAILED,
        MediaKind::Audio => AUDIO_FAILED,
        MediaKind::None => UNSUPPORTED,
    }
    .to_string()
}

/// MIME type inferred from the file extension, with a per-kind fallback.
fn mime_for(kind: MediaKind, path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match kind {
        MediaKind::Image => match ext.as_str() {
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "webp" => "image/webp",
            "gif" => "image/gif",
            _ => "image/jpeg",
        },
        MediaKind::Video => match ext.as_str() {
            "mp4" => "video/mp4",
            "webm" => "video/webm",
            "mov" => "video/quicktime",
            "avi" => "video/x-msvideo",
            _ => "video/mp4",
        },
        MediaKind::Audio => match ext.as_str() {
            "mp3" => "audio/mpeg",
            "wav" => "audio/wav",
            "ogg" => "audio/ogg",
            "aac" => "audio/aac",
            "flac" => "audio/flac",
            _ => "audio/mpeg",
        },
        MediaKind::None => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_from_extension_with_fallback() {
        assert_eq!(mime_for(MediaKind::Image, Path::new("a.PNG")), "image/png");
        assert_eq!(mime_for(MediaKind::Image, Path::new("a.bmp")), "image/jpeg");
        assert_eq!(mime_for(MediaKind::Audio, Path::new("nota.ogg")), "audio/ogg");
        assert_eq!(mime_for(MediaKind::Audio, Path::new("nota")), "audio/mpeg");
        assert_eq!(mime_for(MediaKind::Video, Path::new("v.mov")), "video/quicktime");
        assert_eq!(mime_for(MediaKind::Video, Path::new("v.mkv")), "video/mp4");
    }

    #[tokio::test]
    async fn missing_file_yields_placeholder() {
        let analyzer = GeminiAnalyzer::new(
            "test-key".into(),
            "gemini-1.5-flash".into(),
            PathBuf::from("/nonexistent/uploads"),
            PathBuf::from("/nonexistent/public"),
        );
        let out = analyzer.analyze("no-such-file.jpg", MediaKind::Image).await;
        assert_eq!(out, FILE_MISSING);
    }

    #[tokio::test]
    async fn unsupported_kind_yields_placeholder() {
        let analyzer = GeminiAnalyzer::new(
            "test-key".into(),
            "gemini-1.5-flash".into(),
            PathBuf::from("uploads"),
            PathBuf::from("public"),
        );
        let out = analyzer.analyze("whatever.bin", MediaKind::None).await;
        assert_eq!(out, UNSUPPORTED);
    }
}
