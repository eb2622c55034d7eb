//! Axum API server for Mnemosine.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, Method};
use axum::middleware as axum_mw;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::auth::Authenticator;
use super::middleware::{rate_limit, require_auth, RateLimits};
use super::routes;
use crate::agent::{AgentPool, AgentService, SamplingDefaults, SystemPrompt};
use crate::cache::ResponseCache;
use crate::config::{Config, CorsConfig};
use crate::error::Result;
use crate::health::UsageMetrics;
use crate::providers::ProviderFactory;

/// Request body cap: 1 MiB.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared state for all API handlers.
///
/// Built once at startup; handlers receive it as `State<Arc<AppState>>`.
pub struct AppState {
    pub config: Config,
    pub auth: Authenticator,
    pub pool: Arc<AgentPool>,
    pub cache: Arc<ResponseCache>,
    pub service: AgentService,
    /// Lock-free usage counters (requests, tokens, cache hits, errors).
    pub metrics: Arc<UsageMetrics>,
    pub rate_limits: Arc<RateLimits>,
}

impl AppState {
    pub fn new(
        config: Config,
        factory: Arc<dyn ProviderFactory>,
        system_prompt: &SystemPrompt,
    ) -> Self {
        let pool = Arc::new(
            AgentPool::new(config.pool.size, factory, system_prompt.as_str()).with_defaults(
                &config.providers.default_model,
                &config.providers.default_provider,
            ),
        );
        let cache = Arc::new(ResponseCache::new(
            Duration::from_secs(config.cache.ttl_secs),
            config.cache.enabled,
        ));
        let metrics = Arc::new(UsageMetrics::new());
        let service = AgentService::new(
            Arc::clone(&pool),
            Arc::clone(&cache),
            Arc::clone(&metrics),
            SamplingDefaults {
                temperature: config.providers.temperature,
                max_tokens: config.providers.max_tokens,
            },
        );

        Self {
            auth: Authenticator::new(&config.auth),
            rate_limits: Arc::new(RateLimits::new(&config.rate_limit)),
            pool,
            cache,
            service,
            metrics,
            config,
        }
    }
}

/// Normalize the configured API prefix: leading slash, no trailing slash.
/// An empty result means routes are mounted at the root.
fn api_prefix(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let wildcard = |items: &[String]| items.iter().any(|s| s.trim() == "*");

    let origins = if wildcard(&config.allowed_origins) {
        AllowOrigin::from(Any)
    } else {
        let parsed: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|origin| match origin.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    let methods = if wildcard(&config.allowed_methods) {
        AllowMethods::from(Any)
    } else {
        let parsed: Vec<Method> = config
            .allowed_methods
            .iter()
            .filter_map(|m| Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes()).ok())
            .collect();
        AllowMethods::list(parsed)
    };

    let headers = if wildcard(&config.allowed_headers) {
        AllowHeaders::from(Any)
    } else {
        let parsed: Vec<HeaderName> = config
            .allowed_headers
            .iter()
            .filter_map(|h| h.trim().parse::<HeaderName>().ok())
            .collect();
        AllowHeaders::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(headers)
}

/// Build the axum router with all routes and layers.
pub fn build_router(state: Arc<AppState>) -> Router {
    let public = Router::new()
        .route("/auth/login", post(routes::auth::login))
        .route("/agent/health", get(routes::agent::agent_health))
        .route("/health", get(routes::health::api_health))
        .route(
            "/performance/health-detailed",
            get(routes::performance::health_detailed),
        );

    let protected = Router::new()
        // Auth
        .route("/auth/me", get(routes::auth::me))
        .route("/auth/refresh", post(routes::auth::refresh))
        // Agent
        .route("/agent/prompt", post(routes::agent::prompt))
        .route("/agent/conversation", post(routes::agent::conversation))
        // Performance
        .route("/performance/metrics", get(routes::performance::metrics))
        .route(
            "/performance/agent-pool",
            get(routes::performance::agent_pool),
        )
        .route(
            "/performance/agent-pool/cleanup",
            post(routes::performance::agent_pool_cleanup),
        )
        .route("/performance/cache", get(routes::performance::cache_stats))
        .route(
            "/performance/cache/clear",
            post(routes::performance::cache_clear),
        )
        .route(
            "/performance/cache/cleanup",
            post(routes::performance::cache_cleanup),
        )
        .route_layer(axum_mw::from_fn_with_state(state.clone(), require_auth));

    let api = public.merge(protected);
    let prefix = api_prefix(&state.config.app.api_prefix);

    let app = if prefix.is_empty() {
        // The API health route already owns `/health`.
        Router::new()
            .route("/", get(routes::health::root))
            .merge(api)
    } else {
        Router::new()
            .route("/", get(routes::health::root))
            .route("/health", get(routes::health::app_health))
            .nest(&prefix, api)
    };

    app.layer(axum_mw::from_fn_with_state(state.clone(), rate_limit))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors))
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn start_server<F>(state: Arc<AppState>, addr: SocketAddr, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Mnemosine API listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::providers::testing::MockFactory;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::util::ServiceExt;

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_api_prefix_normalization() {
        assert_eq!(api_prefix("/api/v1"), "/api/v1");
        assert_eq!(api_prefix("api/v1/"), "/api/v1");
        assert_eq!(api_prefix("/"), "");
        assert_eq!(api_prefix(""), "");
    }

    #[test]
    fn test_app_state_uses_config() {
        let state = test_state();
        assert_eq!(state.pool.capacity(), 4);
        assert!(state.cache.is_enabled());
        assert_eq!(state.cache.default_ttl(), Duration::from_secs(3600));
        assert!(state.rate_limits.is_enabled());
    }

    #[tokio::test]
    async fn test_routes_nested_under_prefix() {
        let app = build_router(test_state());
        let response = app.clone().oneshot(get("/api/v1/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get("/agent/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_prefix_mounts_at_root() {
        let mut config = test_config();
        config.app.api_prefix = "/".to_string();
        let app = build_router(state_with(config, MockFactory::new()));

        let response = app.clone().oneshot(get("/agent/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_route_requires_token() {
        let app = build_router(test_state());
        let response = app
            .oneshot(get("/api/v1/performance/cache"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let state = test_state();
        let auth = bearer(&state);
        let app = build_router(state);
        let body = format!(r#"{{"message": "{}"}}"#, "a".repeat(MAX_BODY_BYTES + 10));
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/agent/prompt")
            .header("content-type", "application/json")
            .header("authorization", auth)
            .body(Body::from(body))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_configured_origin() {
        let app = build_router(test_state());
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/v1/agent/prompt")
            .header("origin", "http://localhost:3000")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "http://localhost:3000"
        );
    }
}
