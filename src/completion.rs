//! Answer generation over the assembled prompt.
//!
//! The completion service is optional: with provider `disabled` the
//! engine falls back to an extractive answer built from the best
//! retrieved passage, so retrieval works with no API key at all.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::CompletionConfig;
use crate::error::EngineError;
use crate::retry::{CallError, RetryPolicy};

const SYSTEM_PROMPT: &str =
    "You are a commercial lease assistant. Answer using only the provided \
     context. Be concise and cite nothing beyond it.";

/// An external `prompt -> answer` service.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, CallError>;
}

/// Run one completion with retry.
pub async fn complete(
    client: &dyn CompletionClient,
    config: &CompletionConfig,
    prompt: &str,
) -> Result<String, EngineError> {
    let policy = RetryPolicy::new(config.max_retries);
    policy
        .run("completion", || client.complete(prompt))
        .await
        .map_err(EngineError::CompletionService)
}

/// Instantiate the configured client; `disabled` yields `None`.
pub fn create_client(
    config: &CompletionConfig,
) -> Result<Option<Box<dyn CompletionClient>>, EngineError> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "openai" => Ok(Some(Box::new(OpenAiCompletion::new(config)?))),
        other => Err(EngineError::CompletionService(format!(
            "unknown completion provider: {other}"
        ))),
    }
}

/// Calls `POST /v1/chat/completions` on the OpenAI API (or a compatible
/// endpoint via `completion.url`). Requires `OPENAI_API_KEY`.
pub struct OpenAiCompletion {
    model: String,
    url: String,
    api_key: String,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiCompletion {
    pub fn new(config: &CompletionConfig) -> Result<Self, EngineError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            EngineError::CompletionService("OPENAI_API_KEY is not set".to_string())
        })?;
        let model = config.model.clone().ok_or_else(|| {
            EngineError::CompletionService("completion.model is required for openai".to_string())
        })?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string());
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::CompletionService(format!("http client: {e}")))?;

        Ok(Self {
            model,
            url,
            api_key,
            max_tokens: config.max_tokens,
            client,
        })
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletion {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, CallError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
            "temperature": 0.3,
            "max_tokens": self.max_tokens,
        });

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CallError::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(CallError::Transient(format!("http {status}")));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CallError::Fatal(format!("http {status}: {text}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CallError::Fatal(format!("malformed response: {e}")))?;
        let answer = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| CallError::Fatal("response had no choices".to_string()))?;

        debug!(model = %self.model, chars = answer.len(), "completion received");
        Ok(answer.trim().to_string())
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}
