//! Model call seam and the OpenAI-compatible HTTP client.
//!
//! The orchestrator only depends on the [`ModelClient`] trait, so tests can
//! script replies. The provided implementation speaks the chat completions
//! API of LM Studio, Ollama, vLLM, llama.cpp server, and friends —
//! non-streaming: each turn needs the complete reply before directive
//! extraction can run.

use crate::config::ModelConfig;
use crate::error::{AssistError, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a model conversation.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// A system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// A user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// An assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Text-completion capability consumed by the orchestrator.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Complete a conversation, returning the assistant's reply text.
    ///
    /// # Errors
    ///
    /// [`AssistError::ModelUnreachable`] when the endpoint cannot be
    /// reached, [`AssistError::ModelTimeout`] when the call exceeds its
    /// deadline.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// OpenAI-compatible chat completions client.
pub struct HttpModelClient {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: String,
    temperature: f32,
    max_tokens: usize,
}

impl HttpModelClient {
    /// Create a client from config. The per-call deadline comes from
    /// `request_timeout_secs`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AssistError::Config(format!("cannot build HTTP client: {e}")))?;

        let base = config
            .api_url
            .trim_end_matches('/')
            .trim_end_matches("/v1")
            .trim_end_matches('/');
        let url = format!("{base}/v1/chat/completions");

        info!("model endpoint: {url} model={}", config.api_model);

        Ok(Self {
            client,
            url,
            model: config.api_model.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": false,
        });

        let mut request = self.client.post(&self.url).json(&body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AssistError::ModelTimeout
            } else {
                AssistError::ModelUnreachable(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssistError::ModelUnreachable(format!(
                "model endpoint returned {status}"
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AssistError::ModelUnreachable(format!("malformed model reply: {e}")))?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|content| content.trim().to_owned())
            .ok_or_else(|| {
                AssistError::ModelUnreachable("model reply carried no content".to_owned())
            })
    }
}
