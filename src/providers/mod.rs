//! LLM provider abstraction.
//!
//! [`LlmProvider`] is the single seam between the service and a vendor API.
//! Concrete REST implementations live in [`openai`], [`anthropic`] and
//! [`gemini`]; [`ProviderFactory`] builds them for a normalized [`ModelKey`]
//! so the agent pool never touches credentials directly.

pub mod anthropic;
pub mod gemini;
pub mod model;
pub mod openai;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ProvidersConfig;
use crate::error::{MnemoError, Result};

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use model::{ModelKey, ProviderKind};
pub use openai::OpenAiProvider;

/// Per-request timeout for provider HTTP calls.
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(120);

// ============================================================================
// Messages
// ============================================================================

/// Conversation role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single chat message sent to a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: &str) -> Self {
        Self {
            role: Role::System,
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: content.to_string(),
        }
    }

    pub fn assistant(content: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: content.to_string(),
        }
    }
}

// ============================================================================
// Options / responses
// ============================================================================

/// Sampling options forwarded to the provider. `None` means provider default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ChatOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Token accounting reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Completion returned by [`LlmProvider::chat`].
#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    pub content: String,
    pub usage: Option<Usage>,
}

impl LlmResponse {
    pub fn text(content: &str) -> Self {
        Self {
            content: content.to_string(),
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Total tokens, or 0 when the provider reported none.
    pub fn total_tokens(&self) -> u32 {
        self.usage.map(|u| u.total_tokens).unwrap_or(0)
    }
}

// ============================================================================
// Traits
// ============================================================================

/// A chat-completion backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short provider identifier for logs.
    fn name(&self) -> &str;

    /// Model used when `chat` is called with `model: None`.
    fn default_model(&self) -> &str;

    /// Run one completion over `messages`.
    async fn chat(
        &self,
        messages: Vec<Message>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<LlmResponse>;
}

/// Builds providers for normalized model keys.
pub trait ProviderFactory: Send + Sync {
    /// Fail with [`MnemoError::Config`] if `key`'s provider has no API key.
    fn ensure_credentials(&self, key: &ModelKey) -> Result<()>;

    /// Construct a provider bound to `key`. Performs no network I/O.
    fn create(&self, key: &ModelKey) -> Result<Arc<dyn LlmProvider>>;
}

/// Factory backed by the configured API keys and the REST providers.
#[derive(Debug, Clone)]
pub struct HttpProviderFactory {
    config: ProvidersConfig,
}

impl HttpProviderFactory {
    pub fn new(config: ProvidersConfig) -> Self {
        Self { config }
    }

    fn api_key(&self, kind: ProviderKind) -> Result<&str> {
        api_key_for(&self.config, kind).ok_or_else(|| {
            MnemoError::Config(format!("{} API key not configured", kind.display_name()))
        })
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn ensure_credentials(&self, key: &ModelKey) -> Result<()> {
        self.api_key(key.provider()).map(|_| ())
    }

    fn create(&self, key: &ModelKey) -> Result<Arc<dyn LlmProvider>> {
        let api_key = self.api_key(key.provider())?;
        let provider: Arc<dyn LlmProvider> = match key.provider() {
            ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(api_key, key.model())?),
            ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(api_key, key.model())?),
            ProviderKind::Gemini => Arc::new(GeminiProvider::new_with_key(api_key, key.model())?),
        };
        Ok(provider)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Configured, non-empty API key for `kind`.
pub fn api_key_for(config: &ProvidersConfig, kind: ProviderKind) -> Option<&str> {
    let key = match kind {
        ProviderKind::OpenAi => config.openai_api_key.as_deref(),
        ProviderKind::Anthropic => config.anthropic_api_key.as_deref(),
        ProviderKind::Gemini => config.gemini_api_key.as_deref(),
    };
    key.filter(|k| !k.trim().is_empty())
}

/// Which providers have credentials, keyed `openai` / `gemini` / `anthropic`.
pub fn available_models(config: &ProvidersConfig) -> BTreeMap<&'static str, bool> {
    ProviderKind::ALL
        .iter()
        .map(|kind| (kind.label(), api_key_for(config, *kind).is_some()))
        .collect()
}

/// Shared HTTP client builder for provider implementations.
pub(crate) fn build_http_client() -> Result<Client> {
    Client::builder()
        .timeout(PROVIDER_TIMEOUT)
        .build()
        .map_err(|e| MnemoError::Config(format!("failed to build HTTP client: {e}")))
}

/// Turn a non-2xx provider response into a [`MnemoError::Provider`].
///
/// All three vendors wrap failures as `{"error": {"message": ...}}`; the raw
/// body is used when that shape is absent.
pub(crate) fn provider_http_error(provider: &str, status: u16, body: &str) -> MnemoError {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.trim().to_string());
    MnemoError::Provider(format!("{provider} API error ({status}): {detail}"))
}
