//! The configured [`Provider`] handed to the agent loop.
//!
//! Wraps one [`ChatAdapter`] implementation behind a cheap, cloneable handle
//! so that the retry controller can reopen the stream as often as it needs.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};

use super::adapter::{ChatAdapter, ChatRequest, EventStream, StreamEvent};
use super::anthropic::AnthropicAdapter;
use super::error::ProviderError;
use super::gemini::GeminiAdapter;
use super::kind::ProviderKind;
use super::openai::OpenAiAdapter;
use super::resolve::ModelSelection;
use crate::config::Config;
use crate::constants::{
    ANTHROPIC_BASE_URL, GEMINI_BASE_URL, OLLAMA_DEFAULT_BASE_URL, OPENAI_BASE_URL,
    OPENROUTER_BASE_URL,
};
use crate::message::ConversationEntry;
use crate::tools::spec::ToolSpec;

/// A configured LLM provider ready to handle completion requests.
#[derive(Clone)]
pub struct Provider {
    kind: ProviderKind,
    model: String,
    adapter: Arc<dyn ChatAdapter>,
}

impl Provider {
    /// Builds the adapter for `selection` from config and environment.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::MissingApiKey`] when a hosted provider has no
    /// key, or [`ProviderError::Init`] if the HTTP client cannot be built.
    pub fn from_config(config: &Config, selection: &ModelSelection) -> Result<Self, ProviderError> {
        let kind = selection.provider;
        let http = reqwest::Client::builder()
            .user_agent(concat!("gantry/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Init {
                provider: kind.name().to_string(),
                message: e.to_string(),
            })?;
        let base_url = config.provider_base_url(kind);
        let require_key = || {
            config
                .resolve_api_key(kind)
                .ok_or_else(|| ProviderError::MissingApiKey {
                    provider: kind.name().to_string(),
                    env_var: kind.env_var(),
                })
        };

        let adapter: Arc<dyn ChatAdapter> = match kind {
            ProviderKind::Gemini => Arc::new(GeminiAdapter::new(
                http,
                base_url.unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
                require_key()?,
            )),
            ProviderKind::Anthropic => Arc::new(AnthropicAdapter::new(
                http,
                base_url.unwrap_or_else(|| ANTHROPIC_BASE_URL.to_string()),
                require_key()?,
            )),
            ProviderKind::OpenAI => Arc::new(OpenAiAdapter::new(
                http,
                base_url.unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
                Some(require_key()?),
            )),
            ProviderKind::OpenRouter => Arc::new(OpenAiAdapter::new(
                http,
                base_url.unwrap_or_else(|| OPENROUTER_BASE_URL.to_string()),
                Some(require_key()?),
            )),
            ProviderKind::Ollama => Arc::new(OpenAiAdapter::new(
                http,
                base_url.unwrap_or_else(|| OLLAMA_DEFAULT_BASE_URL.to_string()),
                config.resolve_api_key(kind),
            )),
        };
        tracing::debug!(provider = %kind, model = %selection.model, "provider ready");
        Ok(Self::with_adapter(kind, selection.model.clone(), adapter))
    }

    /// Wraps an existing adapter.
    pub fn with_adapter(kind: ProviderKind, model: impl Into<String>, adapter: Arc<dyn ChatAdapter>) -> Self {
        Self {
            kind,
            model: model.into(),
            adapter,
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Builds a request for this provider's model.
    pub fn request(
        &self,
        system_prompt: &str,
        history: &[ConversationEntry],
        tools: Vec<ToolSpec>,
        temperature: f64,
    ) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            system_prompt: system_prompt.to_string(),
            history: history.to_vec(),
            tools,
            temperature,
        }
    }

    /// Returns a `'static` future opening one stream for `request`.
    ///
    /// Each call opens a fresh stream, which is what the retry controller needs.
    pub fn open(&self, request: ChatRequest) -> BoxFuture<'static, Result<EventStream, ProviderError>> {
        let adapter = Arc::clone(&self.adapter);
        let provider = self.kind;
        async move {
            tracing::info!(
                provider = %provider,
                model = %request.model,
                entries = request.history.len(),
                tools = request.tools.len(),
                "opening stream"
            );
            adapter.stream(&request).await
        }
        .boxed()
    }

    /// One-shot text completion without tools, used for summaries.
    ///
    /// # Errors
    ///
    /// Returns the first [`ProviderError`] raised while opening or draining the stream.
    pub async fn complete(&self, system_prompt: &str, prompt: &str, temperature: f64) -> Result<String, ProviderError> {
        let history = [ConversationEntry::user_text(prompt)];
        let request = self.request(system_prompt, &history, Vec::new(), temperature);
        let mut stream = self.open(request).await?;
        let mut text = String::new();
        while let Some(event) = stream.next().await {
            if let StreamEvent::TextDelta(delta) = event? {
                text.push_str(&delta);
            }
        }
        Ok(text)
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .finish()
    }
}
