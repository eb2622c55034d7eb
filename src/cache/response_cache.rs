//! In-memory LLM response cache with TTL expiry.
//!
//! Cache key is a SHA-256 digest of `(namespace, model, system_prompt,
//! prompt)`. Entries expire lazily on read and are removed in bulk by
//! [`ResponseCache::sweep_expired`]. Concurrent misses for the same key are
//! not coalesced.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::debug;

use crate::health::Recommendation;

/// Key namespace separating single prompts from conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheNamespace {
    Prompt,
    Conversation,
}

impl CacheNamespace {
    fn as_str(self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Conversation => "conversation",
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Aggregate cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub enabled: bool,
    pub default_ttl_secs: u64,
    pub hits: u64,
    pub misses: u64,
}

/// TTL response cache shared across request handlers.
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
    enabled: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("default_ttl", &self.default_ttl)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl ResponseCache {
    pub fn new(default_ttl: Duration, enabled: bool) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
            enabled: AtomicBool::new(enabled),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Build a deterministic cache key.
    ///
    /// Length-prefixed encoding keeps `("a|b", "")` and `("a", "|b")` apart.
    pub fn cache_key(
        namespace: CacheNamespace,
        model: &str,
        system_prompt: &str,
        prompt: &str,
    ) -> String {
        let mut hasher = Sha256::new();
        for part in [namespace.as_str(), model, system_prompt, prompt] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Key for a single-prompt entry.
    pub fn prompt_key(prompt: &str, model: &str, system_prompt: Option<&str>) -> String {
        Self::cache_key(
            CacheNamespace::Prompt,
            model,
            system_prompt.unwrap_or_default(),
            prompt,
        )
    }

    /// Key for a conversation entry.
    pub fn conversation_key(prompt: &str, model: &str) -> String {
        Self::cache_key(CacheNamespace::Conversation, model, "", prompt)
    }

    // -- request-path operations (respect the enabled switch) ---------------

    /// Cached response for a single prompt, if present and unexpired.
    pub async fn lookup(
        &self,
        prompt: &str,
        model: &str,
        system_prompt: Option<&str>,
    ) -> Option<String> {
        let key = Self::prompt_key(prompt, model, system_prompt);
        self.lookup_key(&key, Instant::now()).await
    }

    /// Store a single-prompt response; `ttl` defaults to the configured TTL.
    pub async fn store(
        &self,
        prompt: &str,
        model: &str,
        system_prompt: Option<&str>,
        value: String,
        ttl: Option<Duration>,
    ) {
        let key = Self::prompt_key(prompt, model, system_prompt);
        self.store_key(key, value, ttl, Instant::now()).await;
    }

    pub async fn lookup_conversation(&self, prompt: &str, model: &str) -> Option<String> {
        let key = Self::conversation_key(prompt, model);
        self.lookup_key(&key, Instant::now()).await
    }

    pub async fn store_conversation(
        &self,
        prompt: &str,
        model: &str,
        value: String,
        ttl: Option<Duration>,
    ) {
        let key = Self::conversation_key(prompt, model);
        self.store_key(key, value, ttl, Instant::now()).await;
    }

    /// Look up `key` and decode the stored value with `parse`.
    ///
    /// Only a successful decode counts as a hit. An entry that `parse`
    /// rejects is evicted and counted as a miss.
    pub async fn lookup_with<T>(
        &self,
        key: &str,
        parse: impl FnOnce(&str) -> Option<T>,
    ) -> Option<T> {
        self.lookup_with_at(key, Instant::now(), parse).await
    }

    async fn lookup_with_at<T>(
        &self,
        key: &str,
        now: Instant,
        parse: impl FnOnce(&str) -> Option<T>,
    ) -> Option<T> {
        if !self.is_enabled() {
            return None;
        }
        let decoded = match self.get_at(key, now).await {
            Some(raw) => {
                let decoded = parse(&raw);
                if decoded.is_none() {
                    debug!(key = key.get(..8).unwrap_or(key), "Evicting unreadable cache entry");
                    self.delete(key).await;
                }
                decoded
            }
            None => None,
        };
        let counter = if decoded.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        decoded
    }

    async fn lookup_key(&self, key: &str, now: Instant) -> Option<String> {
        self.lookup_with_at(key, now, |raw| Some(raw.to_string())).await
    }

    async fn store_key(&self, key: String, value: String, ttl: Option<Duration>, now: Instant) {
        if !self.is_enabled() {
            return;
        }
        self.set_at(key, value, ttl, now).await;
    }

    // -- raw key operations -------------------------------------------------

    /// Raw lookup by key. Ignores the enabled switch and the hit counters.
    pub async fn get(&self, key: &str) -> Option<String> {
        self.get_at(key, Instant::now()).await
    }

    /// Raw insert by key. Ignores the enabled switch.
    pub async fn set(&self, key: &str, value: String, ttl: Option<Duration>) {
        self.set_at(key.to_string(), value, ttl, Instant::now()).await;
    }

    /// Remove a key. Returns whether it was present.
    pub async fn delete(&self, key: &str) -> bool {
        self.entries.lock().await.remove(key).is_some()
    }

    pub(crate) async fn get_at(&self, key: &str, now: Instant) -> Option<String> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.value.clone()),
            Some(_) => {
                debug!(key = key.get(..8).unwrap_or(key), "Cache entry expired, removing");
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub(crate) async fn set_at(
        &self,
        key: String,
        value: String,
        ttl: Option<Duration>,
        now: Instant,
    ) {
        let expires_at = now + ttl.unwrap_or(self.default_ttl);
        self.entries
            .lock()
            .await
            .insert(key, CacheEntry { value, expires_at });
    }

    // -- maintenance --------------------------------------------------------

    /// Remove every entry whose expiry is at or before now.
    pub async fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now()).await
    }

    pub(crate) async fn sweep_expired_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "Swept expired cache entries");
        }
        removed
    }

    /// Remove all entries.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    // -- switch / stats -----------------------------------------------------

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            total_entries: self.len().await,
            enabled: self.is_enabled(),
            default_ttl_secs: self.default_ttl.as_secs(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Operator hints for `/performance/cache`.
    pub fn recommendations(&self) -> Vec<Recommendation> {
        let mut recs = Vec::new();
        if !self.is_enabled() {
            recs.push(Recommendation::warning(
                "Cache is disabled. Enable caching for better performance.",
                "cache_enabled",
                false.into(),
            ));
        }
        recs.push(Recommendation::info(
            "Using in-memory cache. Entries are lost on restart and not shared between instances.",
            "cache_type",
            "memory".into(),
        ));
        recs
    }
}
