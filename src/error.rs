//! Crate-wide error type.
//!
//! Every library operation returns [`Result<T>`]. The HTTP layer converts
//! these into status codes in [`crate::api::error`]; the binary wraps them in
//! `anyhow` for context.

use thiserror::Error;

/// Errors produced by the Mnemosine library.
#[derive(Debug, Error)]
pub enum MnemoError {
    /// Missing or invalid configuration (unset API key, bad bcrypt hash, ...).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller-supplied input failed validation.
    #[error("{0}")]
    Validation(String),

    /// Credentials or token rejected.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// An LLM provider call failed (network, non-2xx status, bad payload).
    #[error("Provider error: {0}")]
    Provider(String),

    /// A prompt or conversation could not be processed.
    ///
    /// Wraps provider and configuration failures raised while serving a
    /// request, carrying the original message.
    #[error("{0}")]
    Processing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MnemoError>;

impl MnemoError {
    /// Short machine-readable category, used in logs and error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Validation(_) => "validation_error",
            Self::Unauthorized(_) => "authentication_error",
            Self::Provider(_) => "provider_error",
            Self::Processing(_) => "processing_error",
            Self::Io(_) => "io_error",
            Self::Serialization(_) => "serialization_error",
        }
    }
}
