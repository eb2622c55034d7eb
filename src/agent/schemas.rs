//! Request and response bodies for the agent endpoints.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MnemoError, Result};
use crate::providers::Role;
use crate::utils::sanitize::{validate_model_name, MAX_PROMPT_CHARS};

pub const MAX_TEMPERATURE: f32 = 2.0;
pub const MAX_RESPONSE_TOKENS: u32 = 4000;

/// `POST /agent/prompt` body.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PromptRequest {
    pub message: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Replaces the fixed system prompt for this request.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Accepted for compatibility; not used.
    #[serde(default)]
    pub context: Option<Value>,
}

impl PromptRequest {
    pub fn validate(&self) -> Result<()> {
        validate_message(&self.message)?;
        validate_common(self.model.as_deref(), self.temperature, self.max_tokens)
    }
}

/// One turn of a conversation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// `POST /agent/conversation` body.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConversationRequest {
    pub messages: Vec<ConversationMessage>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

impl ConversationRequest {
    pub fn validate(&self) -> Result<()> {
        let Some(last) = self.messages.last() else {
            return Err(MnemoError::Validation(
                "At least one message is required".to_string(),
            ));
        };
        validate_message(&last.content)?;
        validate_common(self.model.as_deref(), self.temperature, self.max_tokens)
    }
}

fn validate_message(message: &str) -> Result<()> {
    if message.trim().is_empty() {
        return Err(MnemoError::Validation("Message cannot be empty".to_string()));
    }
    if message.chars().count() > MAX_PROMPT_CHARS {
        return Err(MnemoError::Validation(format!(
            "Message must be at most {MAX_PROMPT_CHARS} characters"
        )));
    }
    Ok(())
}

fn validate_common(
    model: Option<&str>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
) -> Result<()> {
    if let Some(model) = model {
        if !validate_model_name(model) {
            return Err(MnemoError::Validation("Invalid model name".to_string()));
        }
    }
    if let Some(t) = temperature {
        if !(0.0..=MAX_TEMPERATURE).contains(&t) {
            return Err(MnemoError::Validation(format!(
                "temperature must be between 0.0 and {MAX_TEMPERATURE}"
            )));
        }
    }
    if let Some(n) = max_tokens {
        if !(1..=MAX_RESPONSE_TOKENS).contains(&n) {
            return Err(MnemoError::Validation(format!(
                "max_tokens must be between 1 and {MAX_RESPONSE_TOKENS}"
            )));
        }
    }
    Ok(())
}

/// Single-prompt response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptResponse {
    pub response: String,
    pub model_used: String,
    pub tokens_used: u32,
    /// Seconds.
    pub processing_time: f64,
    pub conversation_id: Option<String>,
}

/// Tool invocation reported by an agent. Always empty today.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentToolCall {
    pub tool_name: String,
    pub parameters: Value,
    pub result: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMetadata {
    pub message_count: usize,
    pub cached: bool,
}

/// Conversation response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub response: String,
    pub model_used: String,
    pub tokens_used: u32,
    pub processing_time: f64,
    pub tool_calls: Vec<AgentToolCall>,
    pub conversation_id: Option<String>,
    pub metadata: ConversationMetadata,
}

/// Value stored in the response cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub response: String,
    pub tokens_used: u32,
}
