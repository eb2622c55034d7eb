//! System prompt loading.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::{debug, warn};

/// Built-in prompt used when no template is configured or it cannot be read.
pub const DEFAULT_SYSTEM_PROMPT: &str = "
You are Mnemosine, an AI assistant designed to help users with various tasks.

How can I assist you today?
";

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*(app_name|version)\s*\}\}").unwrap());

/// Fixed system prompt shared by every agent handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPrompt {
    text: String,
}

impl Default for SystemPrompt {
    fn default() -> Self {
        Self {
            text: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl SystemPrompt {
    /// Load a template from `path`, substituting `{{ app_name }}` and
    /// `{{ version }}`. Falls back to [`DEFAULT_SYSTEM_PROMPT`] when `path`
    /// is `None`, unreadable, or renders to blank text.
    pub fn load(path: Option<&Path>, app_name: &str, version: &str) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(template) => {
                let text = Self::render(&template, app_name, version);
                if text.trim().is_empty() {
                    warn!(path = %path.display(), "System prompt template is empty, using default");
                    return Self::default();
                }
                debug!(path = %path.display(), "Loaded system prompt template");
                Self { text }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read system prompt, using default");
                Self::default()
            }
        }
    }

    fn render(template: &str, app_name: &str, version: &str) -> String {
        PLACEHOLDER_RE
            .replace_all(template, |caps: &Captures<'_>| match &caps[1] {
                "app_name" => app_name.to_string(),
                _ => version.to_string(),
            })
            .into_owned()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}
