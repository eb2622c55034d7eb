//! Agent pool, system prompt and the prompt/conversation service.

pub mod pool;
pub mod prompt;
pub mod schemas;
pub mod service;

pub use pool::{AgentHandle, AgentPool, PoolStats};
pub use prompt::{SystemPrompt, DEFAULT_SYSTEM_PROMPT};
pub use schemas::{
    AgentResponse, AgentToolCall, CachedResponse, ConversationMessage, ConversationMetadata,
    ConversationRequest, PromptRequest, PromptResponse,
};
pub use service::{AgentService, SamplingDefaults};
