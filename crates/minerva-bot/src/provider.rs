use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("provider returned no completion text")]
    Empty,
}

/// Narrow contract against the language-model provider: submit a prompt,
/// receive text. Dyn-dispatchable so tests can inject stubs.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(&self, system: Option<&str>, user: &str) -> Result<String, ProviderError>;
}

/// OpenAI-compatible chat-completions client.
pub struct OpenAiChat {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiChat {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            base_url,
            model,
            temperature,
            max_tokens,
        }
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_completion_tokens: u32,
    messages: Vec<serde_json::Value>,
}

#[async_trait]
impl ChatProvider for OpenAiChat {
    async fn complete(&self, system: Option<&str>, user: &str) -> Result<String, ProviderError> {
        let mut messages = Vec::new();
        if let Some(system) = system {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        messages.push(serde_json::json!({ "role": "user", "content": user }));

        let body = ChatCompletionRequest {
            model: &self.model,
            temperature: self.temperature,
            max_completion_tokens: self.max_tokens,
            messages,
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, body });
        }

        let payload: serde_json::Value = resp.json().await?;
        let text = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or(ProviderError::Empty)?;
        Ok(text.trim().to_string())
    }
}
