//! Bounded pool of provider-bound agent handles.
//!
//! One handle per normalized [`ModelKey`]. When the pool is full the least
//! recently used handle is evicted. Every read-modify-write of the pool map
//! happens under a single `tokio::sync::Mutex` acquisition; provider calls
//! run outside the lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::ProvidersConfig;
use crate::error::Result;
use crate::health::Recommendation;
use crate::providers::{
    ChatOptions, LlmProvider, LlmResponse, Message, ModelKey, ProviderFactory,
};

/// Pool utilization at or above which a warning is recommended.
const NEAR_FULL_RATIO: f64 = 0.8;

/// A provider bound to one model and the fixed system prompt.
pub struct AgentHandle {
    key: ModelKey,
    provider: Arc<dyn LlmProvider>,
    system_prompt: Arc<str>,
}

impl std::fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHandle")
            .field("key", &self.key.to_string())
            .field("provider", &self.provider.name())
            .finish()
    }
}

impl AgentHandle {
    pub fn key(&self) -> &ModelKey {
        &self.key
    }

    /// Send `prompt` as a single user turn. `system_override` replaces the
    /// fixed system prompt for this call only.
    pub async fn run(
        &self,
        prompt: &str,
        system_override: Option<&str>,
        options: ChatOptions,
    ) -> Result<LlmResponse> {
        let system = system_override.unwrap_or(&*self.system_prompt);
        let messages = vec![Message::system(system), Message::user(prompt)];
        self.provider
            .chat(messages, Some(self.key.model()), options)
            .await
    }
}

struct PoolEntry {
    handle: Arc<AgentHandle>,
    usage: u64,
    last_used: Instant,
}

/// Locked snapshot of the pool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStats {
    pub pool_size: usize,
    pub max_pool_size: usize,
    /// Model keys, sorted.
    pub agents: Vec<String>,
    pub usage_stats: BTreeMap<String, u64>,
    /// Seconds since each handle was last used.
    pub last_used: BTreeMap<String, f64>,
}

pub struct AgentPool {
    entries: Mutex<HashMap<String, PoolEntry>>,
    capacity: usize,
    factory: Arc<dyn ProviderFactory>,
    system_prompt: Arc<str>,
    default_model: String,
    default_provider: String,
}

impl AgentPool {
    /// Create an empty pool. `capacity` is clamped to at least 1.
    pub fn new(capacity: usize, factory: Arc<dyn ProviderFactory>, system_prompt: &str) -> Self {
        let defaults = ProvidersConfig::default();
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            factory,
            system_prompt: Arc::from(system_prompt),
            default_model: defaults.default_model,
            default_provider: defaults.default_provider,
        }
    }

    /// Model and provider used for requests that name no model.
    pub fn with_defaults(mut self, default_model: &str, default_provider: &str) -> Self {
        self.default_model = default_model.to_string();
        self.default_provider = default_provider.to_string();
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Normalize a requested model (or the default) to its pool key.
    pub fn model_key(&self, model: Option<&str>) -> Result<ModelKey> {
        ModelKey::normalize(model.unwrap_or(&self.default_model), &self.default_provider)
    }

    /// Get the handle for `model`, creating it (and evicting the LRU handle
    /// when full) if needed. Performs no network I/O.
    pub async fn acquire(&self, model: Option<&str>) -> Result<Arc<AgentHandle>> {
        self.acquire_at(model, Instant::now()).await
    }

    pub(crate) async fn acquire_at(
        &self,
        model: Option<&str>,
        now: Instant,
    ) -> Result<Arc<AgentHandle>> {
        let key = self.model_key(model)?;
        self.factory.ensure_credentials(&key)?;
        let key_str = key.to_string();

        let mut entries = self.entries.lock().await;

        if let Some(entry) = entries.get_mut(&key_str) {
            entry.usage = entry.usage.saturating_add(1);
            entry.last_used = now;
            return Ok(Arc::clone(&entry.handle));
        }

        let handle = Arc::new(AgentHandle {
            provider: self.factory.create(&key)?,
            key,
            system_prompt: Arc::clone(&self.system_prompt),
        });

        if entries.len() >= self.capacity {
            if let Some(victim) = Self::lru_key(&entries) {
                entries.remove(&victim);
                info!(evicted = %victim, incoming = %key_str, "Agent pool full, evicted LRU handle");
            }
        }

        debug!(agent = %key_str, "Created agent handle");
        entries.insert(
            key_str,
            PoolEntry {
                handle: Arc::clone(&handle),
                usage: 1,
                last_used: now,
            },
        );
        Ok(handle)
    }

    /// Oldest last-used; ties go to the lowest usage, then the smallest key.
    fn lru_key(entries: &HashMap<String, PoolEntry>) -> Option<String> {
        entries
            .iter()
            .min_by(|(ka, a), (kb, b)| {
                a.last_used
                    .cmp(&b.last_used)
                    .then(a.usage.cmp(&b.usage))
                    .then_with(|| ka.cmp(kb))
            })
            .map(|(k, _)| k.clone())
    }

    /// Drop every handle idle strictly longer than `max_idle`.
    pub async fn sweep_idle(&self, max_idle: Duration) {
        self.sweep_idle_at(max_idle, Instant::now()).await;
    }

    pub(crate) async fn sweep_idle_at(&self, max_idle: Duration, now: Instant) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| now.saturating_duration_since(e.last_used) <= max_idle);
        let removed = before - entries.len();
        if removed > 0 {
            info!(removed, remaining = entries.len(), "Swept idle agent handles");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn stats(&self) -> PoolStats {
        self.stats_at(Instant::now()).await
    }

    pub(crate) async fn stats_at(&self, now: Instant) -> PoolStats {
        let entries = self.entries.lock().await;
        let mut agents: Vec<String> = entries.keys().cloned().collect();
        agents.sort();
        PoolStats {
            pool_size: entries.len(),
            max_pool_size: self.capacity,
            agents,
            usage_stats: entries.iter().map(|(k, e)| (k.clone(), e.usage)).collect(),
            last_used: entries
                .iter()
                .map(|(k, e)| {
                    let idle = now.saturating_duration_since(e.last_used).as_secs_f64();
                    (k.clone(), idle)
                })
                .collect(),
        }
    }

    /// Operator hints for `/performance/agent-pool`.
    pub fn recommendations(stats: &PoolStats) -> Vec<Recommendation> {
        let mut recs = Vec::new();
        let utilization = stats.pool_size as f64 / stats.max_pool_size.max(1) as f64;
        if utilization >= NEAR_FULL_RATIO {
            recs.push(Recommendation::warning(
                "Agent pool is nearly full. Consider increasing pool size.",
                "pool_utilization",
                json!(utilization),
            ));
        }
        if stats.pool_size == 0 {
            recs.push(Recommendation::info(
                "No agents in pool. Pool will create agents on demand.",
                "pool_size",
                json!(0),
            ));
        }
        recs
    }
}
