use std::path::PathBuf;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// All runtime configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub uploads_dir: PathBuf,
    pub public_dir: PathBuf,
    pub context_path: PathBuf,

    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub openai_temperature: f32,
    pub openai_max_tokens: u32,

    pub gemini_api_key: String,
    pub gemini_model: String,

    pub chat_message_limit: i64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_or("MINERVA_HOST", "0.0.0.0"),
            port: env_parse("MINERVA_PORT", 5000),
            db_path: env_or("MINERVA_DB_PATH", "minerva.db").into(),
            uploads_dir: env_or("MINERVA_UPLOADS_DIR", "uploads").into(),
            public_dir: env_or("MINERVA_PUBLIC_DIR", "public").into(),
            context_path: env_or("MINERVA_CONTEXT_PATH", "public/pdfs/contexto-chat.txt").into(),

            openai_api_key: env_or("OPENAI_API_KEY", ""),
            openai_base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            openai_model: env_or("OPENAI_MODEL", "gpt-4-turbo"),
            openai_temperature: env_parse("OPENAI_TEMPERATURE", 1.0),
            openai_max_tokens: env_parse("OPENAI_MAX_TOKENS", 2000),

            gemini_api_key: env_or("GEMINI_API_KEY", ""),
            gemini_model: env_or("GEMINI_MODEL", "gemini-1.5-flash"),

            chat_message_limit: env_parse("CHAT_MESSAGE_LIMIT", 5),
        }
    }
}
