//! Model-name normalization.
//!
//! Every request model resolves to a provider-qualified [`ModelKey`]
//! (`openai:gpt-4o`, `anthropic:claude-3-5-sonnet`, `google-gla:gemini-2.0-flash`),
//! which is also the agent pool key.

use std::fmt;

use crate::error::{MnemoError, Result};

/// Supported LLM vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Gemini,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [Self::OpenAi, Self::Anthropic, Self::Gemini];

    /// Prefix used in model keys.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "google-gla",
        }
    }

    /// Short label used in health output and the default-provider setting.
    pub fn label(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        }
    }

    /// Human-readable vendor name for error messages.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::Gemini => "Gemini",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.prefix() == prefix)
    }

    /// Map the `DEFAULT_PROVIDER` setting to a vendor. Only `gemini` selects
    /// a non-OpenAI vendor; every other value, `anthropic` included, falls
    /// back to OpenAI.
    pub fn from_setting(setting: &str) -> Self {
        if setting.trim().eq_ignore_ascii_case("gemini") {
            Self::Gemini
        } else {
            Self::OpenAi
        }
    }

    /// Infer the vendor from a bare model name, if its family is recognizable.
    fn infer(model: &str) -> Option<Self> {
        if model.starts_with("gemini") {
            Some(Self::Gemini)
        } else if model.starts_with("gpt") || model.starts_with("o1") {
            Some(Self::OpenAi)
        } else if model.starts_with("claude") {
            Some(Self::Anthropic)
        } else {
            None
        }
    }
}

/// Provider-qualified model identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelKey {
    provider: ProviderKind,
    model: String,
}

impl ModelKey {
    pub fn new(provider: ProviderKind, model: &str) -> Self {
        Self {
            provider,
            model: model.to_string(),
        }
    }

    /// Normalize a model name.
    ///
    /// Names containing `:` must already carry a known provider prefix.
    /// Bare names are routed by family (`gemini*`, `gpt*`/`o1*`, `claude*`)
    /// and otherwise assigned to `default_provider`.
    pub fn normalize(model: &str, default_provider: &str) -> Result<Self> {
        let model = model.trim();
        if model.is_empty() {
            return Err(MnemoError::Config("model name is empty".to_string()));
        }

        if let Some((prefix, name)) = model.split_once(':') {
            let provider = ProviderKind::from_prefix(prefix)
                .filter(|_| !name.is_empty())
                .ok_or_else(|| {
                    MnemoError::Config(format!("Unsupported model format: {model}"))
                })?;
            return Ok(Self::new(provider, name));
        }

        let provider = ProviderKind::infer(model)
            .unwrap_or_else(|| ProviderKind::from_setting(default_provider));
        Ok(Self::new(provider, model))
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    /// Model name without the provider prefix.
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider.prefix(), self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_inference() {
        let cases = [
            ("gemini-2.0-flash", "google-gla:gemini-2.0-flash"),
            ("gpt-4o", "openai:gpt-4o"),
            ("o1-mini", "openai:o1-mini"),
            ("claude-3-5-sonnet", "anthropic:claude-3-5-sonnet"),
        ];
        for (input, expected) in cases {
            let key = ModelKey::normalize(input, "openai").unwrap();
            assert_eq!(key.to_string(), expected, "input {input}");
        }
    }

    #[test]
    fn test_unknown_family_uses_default_provider() {
        assert_eq!(
            ModelKey::normalize("llama-3", "gemini").unwrap().to_string(),
            "google-gla:llama-3"
        );
        assert_eq!(
            ModelKey::normalize("llama-3", "anthropic").unwrap().to_string(),
            "openai:llama-3"
        );
        assert_eq!(
            ModelKey::normalize("llama-3", "mistral").unwrap().to_string(),
            "openai:llama-3"
        );
    }

    #[test]
    fn test_qualified_name_passes_through() {
        let key = ModelKey::normalize("anthropic:claude-3-haiku", "gemini").unwrap();
        assert_eq!(key.provider(), ProviderKind::Anthropic);
        assert_eq!(key.model(), "claude-3-haiku");
    }

    #[test]
    fn test_unknown_prefix_rejected() {
        let err = ModelKey::normalize("mistral:large", "gemini").unwrap_err();
        assert!(err.to_string().contains("Unsupported model format"));
        assert!(ModelKey::normalize("openai:", "gemini").is_err());
        assert!(ModelKey::normalize("   ", "gemini").is_err());
    }

    #[test]
    fn test_same_model_same_key() {
        let a = ModelKey::normalize("gpt-4o", "gemini").unwrap();
        let b = ModelKey::normalize("openai:gpt-4o", "gemini").unwrap();
        assert_eq!(a, b);
    }
}
