//! Prompt and conversation processing.
//!
//! Pipeline: validate, sanitize, cache lookup, then on a miss acquire a
//! pooled agent, call the provider and store the result.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::ResponseCache;
use crate::error::{MnemoError, Result};
use crate::health::UsageMetrics;
use crate::providers::{ChatOptions, ModelKey};
use crate::utils::sanitize::sanitize_prompt;

use super::pool::AgentPool;
use super::schemas::{
    AgentResponse, CachedResponse, ConversationMetadata, ConversationRequest, PromptRequest,
    PromptResponse,
};

/// Sampling defaults applied when a request leaves them unset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingDefaults {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for SamplingDefaults {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1000,
        }
    }
}

/// Result of a cache-or-provider round trip.
struct Completion {
    response: String,
    tokens_used: u32,
    cached: bool,
}

/// Front door for prompt and conversation requests.
pub struct AgentService {
    pool: Arc<AgentPool>,
    cache: Arc<ResponseCache>,
    metrics: Arc<UsageMetrics>,
    defaults: SamplingDefaults,
}

impl AgentService {
    pub fn new(
        pool: Arc<AgentPool>,
        cache: Arc<ResponseCache>,
        metrics: Arc<UsageMetrics>,
        defaults: SamplingDefaults,
    ) -> Self {
        Self {
            pool,
            cache,
            metrics,
            defaults,
        }
    }

    pub async fn process_prompt(&self, request: &PromptRequest) -> Result<PromptResponse> {
        request.validate()?;
        let started = Instant::now();
        self.metrics.record_request();

        let prompt = sanitize_prompt(&request.message);
        let system = request
            .system_prompt
            .as_deref()
            .map(sanitize_prompt)
            .filter(|s| !s.is_empty());
        let model = request.model.as_deref();
        let options = self.options(request.temperature, request.max_tokens);

        let completion = self
            .complete(model, &prompt, system.as_deref(), options, false)
            .await
            .map_err(|e| self.processing_error("prompt", e))?;

        Ok(PromptResponse {
            response: completion.response,
            model_used: self.model_used(model),
            tokens_used: completion.tokens_used,
            processing_time: started.elapsed().as_secs_f64(),
            conversation_id: None,
        })
    }

    pub async fn process_conversation(
        &self,
        request: &ConversationRequest,
    ) -> Result<AgentResponse> {
        request.validate()?;
        let started = Instant::now();
        self.metrics.record_request();

        let prompt = Self::conversation_prompt(request);
        let model = request.model.as_deref();
        let options = self.options(request.temperature, request.max_tokens);

        let completion = self
            .complete(model, &prompt, None, options, true)
            .await
            .map_err(|e| self.processing_error("conversation", e))?;

        Ok(AgentResponse {
            response: completion.response,
            model_used: self.model_used(model),
            tokens_used: completion.tokens_used,
            processing_time: started.elapsed().as_secs_f64(),
            tool_calls: Vec::new(),
            conversation_id: Some(Uuid::new_v4().to_string()),
            metadata: ConversationMetadata {
                message_count: request.messages.len(),
                cached: completion.cached,
            },
        })
    }

    /// Render prior turns as `role: content` lines ahead of the last message.
    fn conversation_prompt(request: &ConversationRequest) -> String {
        let Some((last, history)) = request.messages.split_last() else {
            return String::new();
        };
        let current = sanitize_prompt(&last.content);
        if history.is_empty() {
            return current;
        }
        let lines: Vec<String> = history
            .iter()
            .map(|m| format!("{}: {}", m.role, sanitize_prompt(&m.content)))
            .collect();
        format!(
            "Previous conversation:\n{}\n\nCurrent message: {}",
            lines.join("\n"),
            current
        )
    }

    async fn complete(
        &self,
        model: Option<&str>,
        prompt: &str,
        system: Option<&str>,
        options: ChatOptions,
        conversation: bool,
    ) -> Result<Completion> {
        let key = self.pool.model_key(model)?;

        if let Some(hit) = self.cached(&key, prompt, system, conversation).await {
            return Ok(hit);
        }

        let handle = self.pool.acquire(model).await?;
        let started = Instant::now();
        self.metrics.record_provider_call();
        let reply = handle.run(prompt, system, options).await?;

        let tokens_used = reply.total_tokens();
        if let Some(usage) = reply.usage {
            self.metrics.record_tokens(
                u64::from(usage.prompt_tokens),
                u64::from(usage.completion_tokens),
            );
        }
        info!(
            model = %key,
            cache_hit = false,
            tokens = tokens_used,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Provider call completed"
        );

        let entry = CachedResponse {
            response: reply.content,
            tokens_used,
        };
        let serialized = serde_json::to_string(&entry)?;
        let key_str = key.to_string();
        if conversation {
            self.cache
                .store_conversation(prompt, &key_str, serialized, None)
                .await;
        } else {
            self.cache
                .store(prompt, &key_str, system, serialized, None)
                .await;
        }

        Ok(Completion {
            response: entry.response,
            tokens_used,
            cached: false,
        })
    }

    async fn cached(
        &self,
        key: &ModelKey,
        prompt: &str,
        system: Option<&str>,
        conversation: bool,
    ) -> Option<Completion> {
        if !self.cache.is_enabled() {
            return None;
        }
        let key_str = key.to_string();
        let cache_key = if conversation {
            ResponseCache::conversation_key(prompt, &key_str)
        } else {
            ResponseCache::prompt_key(prompt, &key_str, system)
        };
        let entry = self
            .cache
            .lookup_with(&cache_key, |raw| {
                serde_json::from_str::<CachedResponse>(raw)
                    .inspect_err(|e| {
                        warn!(model = %key, error = %e, "Discarding unreadable cache entry")
                    })
                    .ok()
            })
            .await;
        self.metrics.record_cache(entry.is_some());
        let entry = entry?;
        info!(model = %key, cache_hit = true, tokens = entry.tokens_used, "Served from cache");
        Some(Completion {
            response: entry.response,
            tokens_used: entry.tokens_used,
            cached: true,
        })
    }

    fn options(&self, temperature: Option<f32>, max_tokens: Option<u32>) -> ChatOptions {
        ChatOptions::new()
            .with_temperature(temperature.unwrap_or(self.defaults.temperature))
            .with_max_tokens(max_tokens.unwrap_or(self.defaults.max_tokens))
    }

    fn model_used(&self, requested: Option<&str>) -> String {
        requested.unwrap_or(self.pool.default_model()).to_string()
    }

    fn processing_error(&self, what: &str, err: MnemoError) -> MnemoError {
        self.metrics.record_error();
        MnemoError::Processing(format!("Error processing {what}: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::schemas::ConversationMessage;
    use crate::providers::testing::MockFactory;
    use crate::providers::{ProviderKind, Role};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    struct Harness {
        service: AgentService,
        factory: Arc<MockFactory>,
        cache: Arc<ResponseCache>,
        metrics: Arc<UsageMetrics>,
    }

    fn harness_with(factory: MockFactory) -> Harness {
        let factory = Arc::new(factory);
        let pool = Arc::new(
            AgentPool::new(4, factory.clone(), "sys").with_defaults("gemini-2.0-flash", "gemini"),
        );
        let cache = Arc::new(ResponseCache::new(Duration::from_secs(60), true));
        let metrics = Arc::new(UsageMetrics::new());
        Harness {
            service: AgentService::new(
                pool,
                cache.clone(),
                metrics.clone(),
                SamplingDefaults::default(),
            ),
            factory,
            cache,
            metrics,
        }
    }

    fn harness() -> Harness {
        harness_with(MockFactory::new())
    }

    fn prompt(message: &str) -> PromptRequest {
        PromptRequest {
            message: message.to_string(),
            ..Default::default()
        }
    }

    fn turn(role: Role, content: &str) -> ConversationMessage {
        ConversationMessage {
            role,
            content: content.to_string(),
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn test_prompt_round_trip_then_cache_hit() {
        let h = harness();
        let first = h.service.process_prompt(&prompt("hello")).await.unwrap();
        assert_eq!(first.response, "echo: hello");
        assert_eq!(first.tokens_used, 12);
        assert_eq!(first.model_used, "gemini-2.0-flash");
        assert!(first.conversation_id.is_none());

        let second = h.service.process_prompt(&prompt("hello")).await.unwrap();
        assert_eq!(second.response, first.response);
        assert_eq!(second.tokens_used, 12);
        assert_eq!(h.factory.calls.load(Ordering::SeqCst), 1);

        let snap = h.metrics.snapshot();
        assert_eq!(snap.requests, 2);
        assert_eq!(snap.provider_calls, 1);
        assert_eq!(snap.cache_hits, 1);
        assert_eq!(snap.cache_misses, 1);
    }

    #[tokio::test]
    async fn test_prompt_is_sanitized_before_provider() {
        let h = harness();
        let resp = h
            .service
            .process_prompt(&prompt("Hello <script>alert('xss')</script> world"))
            .await
            .unwrap();
        assert!(!resp.response.contains("<script>"));
        assert!(resp.response.contains("Hello"));
        assert!(resp.response.contains("world"));
    }

    #[tokio::test]
    async fn test_system_override_is_part_of_cache_key() {
        let h = harness();
        h.service.process_prompt(&prompt("hi")).await.unwrap();
        let with_system = PromptRequest {
            system_prompt: Some("talk like a pirate".into()),
            ..prompt("hi")
        };
        h.service.process_prompt(&with_system).await.unwrap();
        assert_eq!(h.factory.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_calls_provider() {
        let h = harness();
        h.cache.disable();
        h.service.process_prompt(&prompt("hi")).await.unwrap();
        h.service.process_prompt(&prompt("hi")).await.unwrap();
        assert_eq!(h.factory.calls.load(Ordering::SeqCst), 2);
        assert_eq!(h.metrics.snapshot().cache_misses, 0);
    }

    #[tokio::test]
    async fn test_model_used_echoes_request() {
        let h = harness();
        let req = PromptRequest {
            model: Some("gpt-4o".into()),
            ..prompt("hi")
        };
        let resp = h.service.process_prompt(&req).await.unwrap();
        assert_eq!(resp.model_used, "gpt-4o");
    }

    #[tokio::test]
    async fn test_validation_error_is_not_wrapped() {
        let h = harness();
        let req = PromptRequest {
            model: Some("invalid/model/name".into()),
            ..prompt("hi")
        };
        let err = h.service.process_prompt(&req).await.unwrap_err();
        assert!(matches!(err, MnemoError::Validation(_)));
        assert_eq!(h.metrics.snapshot().requests, 0);
    }

    #[tokio::test]
    async fn test_provider_failure_becomes_processing_error() {
        let h = harness_with(MockFactory::new().failing());
        let err = h.service.process_prompt(&prompt("hi")).await.unwrap_err();
        assert!(matches!(err, MnemoError::Processing(_)));
        assert!(err.to_string().starts_with("Error processing prompt: "));
        assert!(err.to_string().contains("upstream exploded"));
        assert_eq!(h.metrics.snapshot().errors, 1);
        assert!(h.cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_missing_key_becomes_processing_error() {
        let h = harness_with(MockFactory::new().without(ProviderKind::Gemini));
        let req = ConversationRequest {
            messages: vec![turn(Role::User, "hi")],
            ..Default::default()
        };
        let err = h.service.process_conversation(&req).await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Error processing conversation: "));
        assert!(err.to_string().contains("Gemini API key not configured"));
    }

    #[tokio::test]
    async fn test_conversation_prompt_and_metadata() {
        let h = harness();
        let req = ConversationRequest {
            messages: vec![
                turn(Role::User, "What is Rust?"),
                turn(Role::Assistant, "A <b>language</b>."),
                turn(Role::User, "Who made it?"),
            ],
            ..Default::default()
        };

        let rendered = AgentService::conversation_prompt(&req);
        assert_eq!(
            rendered,
            "Previous conversation:\nuser: What is Rust?\nassistant: A language.\n\nCurrent message: Who made it?"
        );

        let first = h.service.process_conversation(&req).await.unwrap();
        assert_eq!(first.metadata.message_count, 3);
        assert!(!first.metadata.cached);
        assert!(first.tool_calls.is_empty());
        let id = first.conversation_id.clone().unwrap();
        assert!(Uuid::parse_str(&id).is_ok());

        let second = h.service.process_conversation(&req).await.unwrap();
        assert!(second.metadata.cached);
        assert_ne!(second.conversation_id, first.conversation_id);
        assert_eq!(h.factory.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_single_message_conversation_is_bare() {
        let req = ConversationRequest {
            messages: vec![turn(Role::User, "  just   this ")],
            ..Default::default()
        };
        assert_eq!(AgentService::conversation_prompt(&req), "just this");
    }

    #[tokio::test]
    async fn test_corrupt_cache_entry_falls_through() {
        let h = harness();
        let key = h.service.pool.model_key(None).unwrap().to_string();
        h.cache.store("hi", &key, None, "not json".into(), None).await;
        let resp = h.service.process_prompt(&prompt("hi")).await.unwrap();
        assert_eq!(resp.response, "echo: hi");
        assert_eq!(h.factory.calls.load(Ordering::SeqCst), 1);

        let usage = h.metrics.snapshot();
        assert_eq!(usage.cache_hits, 0);
        assert_eq!(usage.cache_misses, 1);
        let stats = h.cache.stats().await;
        assert_eq!((stats.hits, stats.misses), (0, 1));

        // The bad entry was replaced by the fresh response.
        let again = h.service.process_prompt(&prompt("hi")).await.unwrap();
        assert_eq!(again.response, "echo: hi");
        assert_eq!(h.factory.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.metrics.snapshot().cache_hits, 1);
    }
}
