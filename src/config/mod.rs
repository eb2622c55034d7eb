//! Application configuration.
//!
//! Layering, lowest to highest precedence:
//! 1. Built-in defaults ([`Config::default`])
//! 2. Optional JSON file named by `MNEMOSINE_CONFIG`
//! 3. Environment variables (a `.env` file is loaded first via `dotenvy`)
//!
//! Environment keys keep the flat upper-case names operators already use
//! (`SECRET_KEY`, `ADMIN_USERNAME`, `CACHE_TTL`, ...). See
//! [`Config::apply_env_overrides`] for the full list.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{MnemoError, Result};

/// Environment variable naming an optional JSON config file.
pub const CONFIG_PATH_ENV: &str = "MNEMOSINE_CONFIG";

/// Minimum accepted length of the JWT signing secret.
pub const MIN_SECRET_KEY_LEN: usize = 32;

// ============================================================================
// Sections
// ============================================================================

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub debug: bool,
    /// Prefix every API route is nested under.
    pub api_prefix: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "Mnemosine Backend".to_string(),
            debug: false,
            api_prefix: "/api/v1".to_string(),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Token signing and the single admin account.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 signing secret. Must be at least [`MIN_SECRET_KEY_LEN`] chars.
    pub secret_key: String,
    pub access_token_expire_minutes: i64,
    pub admin_username: String,
    /// bcrypt hash of the admin password.
    pub admin_password_hash: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            access_token_expire_minutes: 30,
            admin_username: String::new(),
            admin_password_hash: String::new(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret_key", &redact(&self.secret_key))
            .field(
                "access_token_expire_minutes",
                &self.access_token_expire_minutes,
            )
            .field("admin_username", &self.admin_username)
            .field("admin_password_hash", &redact(&self.admin_password_hash))
            .finish()
    }
}

impl AuthConfig {
    /// Token lifetime in seconds, as reported in `expires_in`.
    pub fn token_ttl_secs(&self) -> i64 {
        self.access_token_expire_minutes.saturating_mul(60)
    }
}

/// LLM provider credentials and request defaults.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    /// Model used when a request does not name one.
    pub default_model: String,
    /// Provider assumed for model names without a recognizable prefix.
    pub default_provider: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            anthropic_api_key: None,
            gemini_api_key: None,
            default_model: "gemini-2.0-flash".to_string(),
            default_provider: "gemini".to_string(),
            max_tokens: 1000,
            temperature: 0.7,
        }
    }
}

impl std::fmt::Debug for ProvidersConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvidersConfig")
            .field("openai_api_key", &self.openai_api_key.as_deref().map(redact))
            .field(
                "anthropic_api_key",
                &self.anthropic_api_key.as_deref().map(redact),
            )
            .field("gemini_api_key", &self.gemini_api_key.as_deref().map(redact))
            .field("default_model", &self.default_model)
            .field("default_provider", &self.default_provider)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// In-memory response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Default entry lifetime in seconds.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
        }
    }
}

/// Agent pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of live agent handles.
    pub size: usize,
    /// Handles idle longer than this are dropped by the sweep.
    pub idle_timeout_secs: u64,
    /// Period of the background cache/pool sweep.
    pub maintenance_interval_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 10,
            idle_timeout_secs: 3600,
            maintenance_interval_secs: 300,
        }
    }
}

/// Per-client rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Limit applied to routes without a dedicated one.
    pub per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            per_minute: 60,
        }
    }
}

/// CORS allow-lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:8000".to_string(),
            ],
            allowed_methods: ["GET", "POST", "PUT", "DELETE"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allowed_headers: vec!["*".to_string()],
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level directive; `RUST_LOG` still takes precedence.
    pub level: Option<String>,
    pub format: LogFormat,
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub app: AppConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    /// Accepted and validated but not used by any endpoint.
    pub database_url: Option<String>,
    pub providers: ProvidersConfig,
    pub cache: CacheConfig,
    pub pool: PoolConfig,
    pub rate_limit: RateLimitConfig,
    pub cors: CorsConfig,
    pub logging: LoggingConfig,
    /// Optional system prompt template file.
    pub system_prompt_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `.env`, the optional JSON file, and the
    /// process environment.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::load_from_path(Path::new(path.trim()))?,
            _ => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a JSON config file. Missing fields take their defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            MnemoError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        serde_json::from_str(&raw)
            .map_err(|e| MnemoError::Config(format!("invalid config {}: {e}", path.display())))
    }

    /// Apply environment overrides using `lookup` to resolve each key.
    ///
    /// Unparseable numeric or boolean values are logged and ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("APP_NAME") {
            self.app.name = v;
        }
        parse_into(&get, "DEBUG", &mut self.app.debug);
        if let Some(v) = get("API_V1_PREFIX") {
            self.app.api_prefix = v;
        }

        if let Some(v) = get("HOST") {
            self.server.host = v;
        }
        parse_into(&get, "PORT", &mut self.server.port);

        if let Some(v) = get("SECRET_KEY") {
            self.auth.secret_key = v;
        }
        parse_into(
            &get,
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            &mut self.auth.access_token_expire_minutes,
        );
        if let Some(v) = get("ADMIN_USERNAME") {
            self.auth.admin_username = v;
        }
        if let Some(v) = get("ADMIN_PASSWORD_HASH") {
            self.auth.admin_password_hash = v;
        }

        if let Some(v) = get("DATABASE_URL") {
            self.database_url = Some(v);
        }

        if let Some(v) = get("OPENAI_API_KEY") {
            self.providers.openai_api_key = Some(v);
        }
        if let Some(v) = get("ANTHROPIC_API_KEY") {
            self.providers.anthropic_api_key = Some(v);
        }
        if let Some(v) = get("GEMINI_API_KEY") {
            self.providers.gemini_api_key = Some(v);
        }
        if let Some(v) = get("DEFAULT_MODEL") {
            self.providers.default_model = v;
        }
        if let Some(v) = get("DEFAULT_PROVIDER") {
            self.providers.default_provider = v.trim().to_lowercase();
        }
        parse_into(&get, "MAX_TOKENS", &mut self.providers.max_tokens);
        parse_into(&get, "TEMPERATURE", &mut self.providers.temperature);

        parse_into(&get, "CACHE_ENABLED", &mut self.cache.enabled);
        parse_into(&get, "CACHE_TTL", &mut self.cache.ttl_secs);

        parse_into(&get, "AGENT_POOL_SIZE", &mut self.pool.size);
        parse_into(&get, "AGENT_IDLE_TIMEOUT", &mut self.pool.idle_timeout_secs);
        parse_into(
            &get,
            "MAINTENANCE_INTERVAL",
            &mut self.pool.maintenance_interval_secs,
        );

        parse_into(&get, "RATE_LIMIT_ENABLED", &mut self.rate_limit.enabled);
        parse_into(&get, "RATE_LIMIT_PER_MINUTE", &mut self.rate_limit.per_minute);

        if let Some(v) = get("ALLOWED_ORIGINS") {
            self.cors.allowed_origins = parse_list(&v);
        }
        if let Some(v) = get("ALLOWED_METHODS") {
            self.cors.allowed_methods = parse_list(&v);
        }
        if let Some(v) = get("ALLOWED_HEADERS") {
            self.cors.allowed_headers = parse_list(&v);
        }

        if let Some(v) = get("LOG_LEVEL") {
            self.logging.level = Some(v);
        }
        parse_into(&get, "LOG_FORMAT", &mut self.logging.format);

        if let Some(v) = get("SYSTEM_PROMPT_PATH") {
            self.system_prompt_path = Some(PathBuf::from(v));
        }
    }

    /// Every configuration problem found, in field order. Empty when valid.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.auth.secret_key.is_empty() {
            problems.push("SECRET_KEY must be set".to_string());
        } else if self.auth.secret_key.chars().count() < MIN_SECRET_KEY_LEN {
            problems.push(format!(
                "SECRET_KEY must be at least {MIN_SECRET_KEY_LEN} characters"
            ));
        }
        if self.auth.access_token_expire_minutes <= 0 {
            problems.push("ACCESS_TOKEN_EXPIRE_MINUTES must be positive".to_string());
        }
        if self.auth.admin_username.is_empty() {
            problems.push("ADMIN_USERNAME must be set".to_string());
        }
        if !self.auth.admin_password_hash.starts_with("$2") {
            problems.push("ADMIN_PASSWORD_HASH must be a valid bcrypt hash".to_string());
        }
        if let Some(url) = &self.database_url {
            if !url.starts_with("postgresql://") {
                problems.push("DATABASE_URL must be a valid PostgreSQL URL".to_string());
            }
        }
        if !self.app.api_prefix.starts_with('/') || self.app.api_prefix.len() < 2 {
            problems.push("API_V1_PREFIX must start with '/' and not be the root".to_string());
        }
        if !(0.0..=2.0).contains(&self.providers.temperature) {
            problems.push("TEMPERATURE must be between 0.0 and 2.0".to_string());
        }

        problems
    }

    /// Fail with a [`MnemoError::Config`] listing every problem.
    pub fn validate(&self) -> Result<()> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(MnemoError::Config(problems.join("; ")))
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn redact(value: &str) -> &'static str {
    if value.is_empty() {
        ""
    } else {
        "[REDACTED]"
    }
}

fn parse_into<T, G>(get: &G, key: &str, target: &mut T)
where
    T: ParseEnv,
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(key) {
        match T::parse_env(raw.trim()) {
            Some(value) => *target = value,
            None => warn!(key, value = %raw, "Ignoring unparseable environment value"),
        }
    }
}

/// Parse a comma-separated list or a JSON array of strings.
pub fn parse_list(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        if let Ok(items) = serde_json::from_str::<Vec<String>>(trimmed) {
            return items;
        }
    }
    trimmed
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Environment value parsing with lenient booleans.
trait ParseEnv: Sized {
    fn parse_env(raw: &str) -> Option<Self>;
}

impl ParseEnv for bool {
    fn parse_env(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    }
}

macro_rules! parse_env_via_from_str {
    ($($ty:ty),*) => {
        $(impl ParseEnv for $ty {
            fn parse_env(raw: &str) -> Option<Self> {
                raw.parse().ok()
            }
        })*
    };
}

parse_env_via_from_str!(u16, u32, u64, i64, usize, f32, LogFormat);
