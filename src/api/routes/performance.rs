//! Performance diagnostics: process metrics, pool and cache inspection.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use tracing::info;

use crate::agent::AgentPool;
use crate::api::server::AppState;
use crate::cache::ResponseCache;
use crate::health::ProcessSnapshot;

/// Response-time budget for `/health-detailed`, seconds.
const RESPONSE_TIME_THRESHOLD: f64 = 0.1;
const OPTIMAL_RESPONSE_TIME: f64 = 0.05;
const HEALTH_CHECK_KEY: &str = "__health_check__";

fn performance_status(secs: f64) -> &'static str {
    if secs < OPTIMAL_RESPONSE_TIME {
        "optimal"
    } else if secs < RESPONSE_TIME_THRESHOLD {
        "acceptable"
    } else {
        "degraded"
    }
}

/// Round-trip a value through the raw cache operations.
async fn check_cache(cache: &ResponseCache) -> bool {
    cache
        .set(
            HEALTH_CHECK_KEY,
            "ok".to_string(),
            Some(Duration::from_secs(1)),
        )
        .await;
    let ok = cache.get(HEALTH_CHECK_KEY).await.as_deref() == Some("ok");
    cache.delete(HEALTH_CHECK_KEY).await;
    ok
}

async fn check_pool(pool: &AgentPool) -> bool {
    pool.acquire(None).await.is_ok()
}

/// GET /performance/metrics
pub async fn metrics(State(state): State<Arc<AppState>>) -> Json<Value> {
    let now = chrono::Utc::now();
    Json(json!({
        "timestamp": now.timestamp_millis() as f64 / 1000.0,
        "process": ProcessSnapshot::capture(&state.metrics),
        "usage": state.metrics.snapshot(),
        "agent_pool": state.pool.stats().await,
        "cache": {
            "enabled": state.cache.is_enabled(),
            "type": "memory",
            "stats": state.cache.stats().await,
        },
    }))
}

/// GET /performance/health-detailed
///
/// Public. Exercises the pool (acquire of the default model) and the cache
/// (raw set/get/delete) and reports how long that took.
pub async fn health_detailed(State(state): State<Arc<AppState>>) -> Json<Value> {
    let started = Instant::now();
    let agent_available = check_pool(&state.pool).await;
    let cache_available = check_cache(&state.cache).await;
    let response_time = started.elapsed().as_secs_f64();

    let pool_stats = state.pool.stats().await;
    Json(json!({
        "status": "healthy",
        "checks": {
            "agent_pool": {
                "available": agent_available,
                "pool_size": pool_stats.pool_size,
                "max_pool_size": pool_stats.max_pool_size,
            },
            "cache": {
                "available": cache_available,
                "enabled": state.cache.is_enabled(),
            },
            "response_time": {
                "value": response_time,
                "unit": "seconds",
                "threshold": RESPONSE_TIME_THRESHOLD,
                "healthy": response_time < RESPONSE_TIME_THRESHOLD,
            },
        },
        "performance": {
            "response_time_ms": response_time * 1000.0,
            "status": performance_status(response_time),
        },
    }))
}

/// GET /performance/agent-pool
pub async fn agent_pool(State(state): State<Arc<AppState>>) -> Json<Value> {
    let stats = state.pool.stats().await;
    let recommendations = AgentPool::recommendations(&stats);
    Json(json!({
        "pool_stats": stats,
        "recommendations": recommendations,
    }))
}

/// POST /performance/agent-pool/cleanup
pub async fn agent_pool_cleanup(State(state): State<Arc<AppState>>) -> Json<Value> {
    let idle = Duration::from_secs(state.config.pool.idle_timeout_secs);
    state.pool.sweep_idle(idle).await;
    info!("Agent pool cleanup requested");
    Json(json!({
        "message": "Agent pool cleanup completed",
        "new_stats": state.pool.stats().await,
    }))
}

/// GET /performance/cache
pub async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "cache_enabled": state.cache.is_enabled(),
        "cache_type": "memory",
        "stats": state.cache.stats().await,
        "recommendations": state.cache.recommendations(),
    }))
}

/// POST /performance/cache/clear
pub async fn cache_clear(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.cache.clear().await;
    info!("Response cache cleared");
    Json(json!({ "message": "Cache cleared successfully" }))
}

/// POST /performance/cache/cleanup
pub async fn cache_cleanup(State(state): State<Arc<AppState>>) -> Json<Value> {
    let removed = state.cache.sweep_expired().await;
    Json(json!({
        "message": "Cache cleanup completed",
        "removed": removed,
    }))
}
