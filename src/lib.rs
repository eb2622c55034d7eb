//! Mnemosine: a single-admin HTTP gateway to LLM providers.
//!
//! Requests are validated and sanitized, answered from an in-memory TTL
//! cache when possible, and otherwise routed through a bounded pool of
//! provider-bound agent handles. See [`api::build_router`] for the HTTP
//! surface and [`agent::AgentService`] for the request path.

pub mod agent;
pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod health;
pub mod maintenance;
pub mod providers;
pub mod utils;

pub use config::Config;
pub use error::{MnemoError, Result};

/// Crate version reported by the info and health endpoints.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
