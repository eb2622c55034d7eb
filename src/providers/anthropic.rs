//! Anthropic provider over the Messages API.
//!
//! System prompts go in the dedicated `system` field; `max_tokens` is
//! mandatory on this API, so a default is supplied when the caller has none.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MnemoError, Result};

use super::{
    build_http_client, provider_http_error, ChatOptions, LlmProvider, LlmResponse, Message, Role,
    Usage,
};

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    api_key: String,
    model: String,
    client: Client,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .finish()
    }
}

impl AnthropicProvider {
    pub fn new(api_key: &str, model: &str) -> Result<Self> {
        Ok(Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            client: build_http_client()?,
        })
    }

    fn build_request<'a>(
        messages: &'a [Message],
        model: &'a str,
        options: &ChatOptions,
    ) -> MessagesRequest<'a> {
        let system = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>();

        MessagesRequest {
            model,
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            messages: messages
                .iter()
                .filter(|m| m.role != Role::System)
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            temperature: options.temperature,
        }
    }

    fn into_response(body: MessagesResponse) -> LlmResponse {
        let content: String = body
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();
        let mut response = LlmResponse::text(&content);
        if let Some(usage) = body.usage {
            response = response.with_usage(Usage::new(usage.input_tokens, usage.output_tokens));
        }
        response
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn chat(
        &self,
        messages: Vec<Message>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<LlmResponse> {
        let model = model.unwrap_or(&self.model);
        let request = Self::build_request(&messages, model, &options);

        debug!(model, messages = request.messages.len(), "Anthropic request");

        let response = self
            .client
            .post(format!("{}/messages", ANTHROPIC_API_BASE))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| MnemoError::Provider(format!("Anthropic request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(provider_http_error("Anthropic", status.as_u16(), &error_text));
        }

        let body: MessagesResponse = response.json().await.map_err(|e| {
            MnemoError::Provider(format!("Failed to parse Anthropic response: {}", e))
        })?;
        Ok(Self::into_response(body))
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_lifts_system_and_defaults_max_tokens() {
        let messages = vec![Message::system("Be brief"), Message::user("Hi")];
        let request = AnthropicProvider::build_request(&messages, "claude-3-haiku", &ChatOptions::new());
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["system"], "Be brief");
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_request_without_system_omits_field() {
        let messages = vec![Message::user("Hi")];
        let options = ChatOptions::new().with_max_tokens(100);
        let request = AnthropicProvider::build_request(&messages, "claude-3-haiku", &options);
        let body = serde_json::to_value(&request).unwrap();
        assert!(body.get("system").is_none());
        assert_eq!(body["max_tokens"], 100);
    }

    #[test]
    fn test_response_joins_text_blocks() {
        let body: MessagesResponse = serde_json::from_value(json!({
            "content": [
                { "type": "text", "text": "Hello " },
                { "type": "tool_use", "id": "x", "name": "y", "input": {} },
                { "type": "text", "text": "there" }
            ],
            "usage": { "input_tokens": 9, "output_tokens": 2 }
        }))
        .unwrap();
        let response = AnthropicProvider::into_response(body);
        assert_eq!(response.content, "Hello there");
        assert_eq!(response.total_tokens(), 11);
    }
}
