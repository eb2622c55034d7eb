//! Periodic cache, agent-pool and rate-limiter sweeping.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::agent::AgentPool;
use crate::api::middleware::RateLimits;
use crate::cache::ResponseCache;

/// Spawn the background sweep loop.
///
/// Every `interval` it removes expired cache entries, agent handles idle
/// longer than `idle_timeout` and rate-limit state for clients whose budget
/// has refilled. Stops when `shutdown` flips to `true` or its
/// sender is dropped.
pub fn spawn_maintenance(
    pool: Arc<AgentPool>,
    cache: Arc<ResponseCache>,
    rate_limits: Arc<RateLimits>,
    interval: Duration,
    idle_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            interval_secs = interval.as_secs(),
            idle_timeout_secs = idle_timeout.as_secs(),
            "Maintenance task started"
        );
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Maintenance task shutting down");
                        return;
                    }
                }
                _ = tokio::time::sleep(interval) => {
                    run_once(&pool, &cache, &rate_limits, idle_timeout).await;
                }
            }
        }
    })
}

/// One sweep of the cache, the pool and the rate limiters.
pub async fn run_once(
    pool: &AgentPool,
    cache: &ResponseCache,
    rate_limits: &RateLimits,
    idle_timeout: Duration,
) {
    let removed = cache.sweep_expired().await;
    pool.sweep_idle(idle_timeout).await;
    let pool_size = pool.len().await;
    let rate_limited_clients = rate_limits.retain_recent();
    debug!(
        cache_removed = removed,
        pool_size,
        rate_limited_clients,
        "Maintenance sweep complete"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::providers::testing::MockFactory;
    use std::net::{IpAddr, Ipv4Addr};

    fn fixtures() -> (Arc<AgentPool>, Arc<ResponseCache>, Arc<RateLimits>) {
        let pool = Arc::new(AgentPool::new(4, Arc::new(MockFactory::new()), "sys"));
        let cache = Arc::new(ResponseCache::new(Duration::from_secs(60), true));
        let limits = Arc::new(RateLimits::new(&RateLimitConfig::default()));
        (pool, cache, limits)
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_sweep_future_is_send() {
        let (pool, cache, limits) = fixtures();
        let sweep = run_once(&pool, &cache, &limits, Duration::from_secs(1));
        assert_send(&sweep);
    }

    #[tokio::test]
    async fn test_run_once_sweeps_expired_and_idle() {
        let (pool, cache, limits) = fixtures();
        cache
            .set("stale", "v".into(), Some(Duration::from_millis(1)))
            .await;
        cache.set("fresh", "v".into(), None).await;
        pool.acquire(Some("gpt-4o")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        run_once(&pool, &cache, &limits, Duration::from_millis(5)).await;

        assert_eq!(cache.len().await, 1);
        assert!(cache.get("fresh").await.is_some());
        assert!(pool.is_empty().await);
    }

    #[tokio::test]
    async fn test_run_once_keeps_clients_with_spent_budget() {
        let (pool, cache, limits) = fixtures();
        let client = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20));
        limits.check("/api/v1/auth/login", client).unwrap();

        run_once(&pool, &cache, &limits, Duration::from_secs(60)).await;

        assert_eq!(limits.retain_recent(), 1);
    }

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let (pool, cache, limits) = fixtures();
        let (tx, rx) = watch::channel(false);
        let handle = spawn_maintenance(
            pool,
            cache,
            limits,
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            rx,
        );
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_periodic_sweep_runs() {
        let (pool, cache, limits) = fixtures();
        cache
            .set("stale", "v".into(), Some(Duration::from_millis(1)))
            .await;
        let (tx, rx) = watch::channel(false);
        let handle = spawn_maintenance(
            pool,
            cache.clone(),
            limits,
            Duration::from_millis(20),
            Duration::from_secs(3600),
            rx,
        );

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.is_empty().await);

        let _ = tx.send(true);
        let _ = handle.await;
    }
}
