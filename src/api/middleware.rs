//! Request middleware: bearer authentication and per-client rate limits.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tracing::warn;

use super::error::ApiError;
use super::server::AppState;
use crate::config::RateLimitConfig;

// ============================================================================
// Authentication
// ============================================================================

/// Pull the token out of `Authorization: Bearer <token>`.
///
/// The scheme is matched case-insensitively. Returns `None` when the header
/// is absent, not UTF-8, uses another scheme or carries an empty token.
fn bearer_token(request: &Request) -> Option<&str> {
    let value = request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Guard for protected routes.
///
/// Missing or non-bearer credentials are rejected with 403; a bad, expired
/// or foreign token with 401. On success the resolved
/// [`CurrentUser`](super::auth::CurrentUser) is stored in the request
/// extensions for handlers to extract.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&request).ok_or(ApiError::NotAuthenticated)?;
    let user = state.auth.resolve(token)?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

// ============================================================================
// Rate limiting
// ============================================================================

/// Route groups with their own per-minute budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Login,
    Refresh,
    Prompt,
    Conversation,
    Other,
}

impl RouteClass {
    pub fn classify(path: &str) -> Self {
        let path = path.trim_end_matches('/');
        if path.ends_with("/auth/login") {
            Self::Login
        } else if path.ends_with("/auth/refresh") {
            Self::Refresh
        } else if path.ends_with("/agent/prompt") {
            Self::Prompt
        } else if path.ends_with("/agent/conversation") {
            Self::Conversation
        } else {
            Self::Other
        }
    }
}

/// Keyed GCRA limiter for one route group.
pub struct RouteLimiter {
    per_minute: NonZeroU32,
    limiter: DefaultKeyedRateLimiter<IpAddr>,
}

impl RouteLimiter {
    pub fn per_minute(limit: u32) -> Self {
        let per_minute = NonZeroU32::new(limit).unwrap_or(NonZeroU32::MIN);
        Self::with_quota(per_minute, Quota::per_minute(per_minute))
    }

    /// `per_minute` is the figure reported to clients; `quota` drives the
    /// limiter.
    fn with_quota(per_minute: NonZeroU32, quota: Quota) -> Self {
        Self {
            per_minute,
            limiter: RateLimiter::keyed(quota),
        }
    }

    pub fn limit(&self) -> u32 {
        self.per_minute.get()
    }

    /// Consume one cell for `client`; on refusal returns seconds to wait,
    /// rounded up and at least 1.
    pub fn check(&self, client: IpAddr) -> Result<(), u64> {
        self.limiter.check_key(&client).map_err(|not_until| {
            let wait = not_until.wait_time_from(DefaultClock::default().now());
            (wait.as_secs_f64().ceil() as u64).max(1)
        })
    }

    /// Number of clients with tracked state.
    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }

    /// Forget clients whose budget has fully replenished.
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }
}

/// All route limiters plus the global switch.
pub struct RateLimits {
    enabled: bool,
    login: RouteLimiter,
    refresh: RouteLimiter,
    prompt: RouteLimiter,
    conversation: RouteLimiter,
    default: RouteLimiter,
}

impl std::fmt::Debug for RateLimits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimits")
            .field("enabled", &self.enabled)
            .field("default_per_minute", &self.default.limit())
            .finish_non_exhaustive()
    }
}

impl RateLimits {
    pub const LOGIN_PER_MINUTE: u32 = 5;
    pub const REFRESH_PER_MINUTE: u32 = 10;
    pub const PROMPT_PER_MINUTE: u32 = 30;
    pub const CONVERSATION_PER_MINUTE: u32 = 20;

    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            login: RouteLimiter::per_minute(Self::LOGIN_PER_MINUTE),
            refresh: RouteLimiter::per_minute(Self::REFRESH_PER_MINUTE),
            prompt: RouteLimiter::per_minute(Self::PROMPT_PER_MINUTE),
            conversation: RouteLimiter::per_minute(Self::CONVERSATION_PER_MINUTE),
            default: RouteLimiter::per_minute(config.per_minute),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn limiter(&self, class: RouteClass) -> &RouteLimiter {
        match class {
            RouteClass::Login => &self.login,
            RouteClass::Refresh => &self.refresh,
            RouteClass::Prompt => &self.prompt,
            RouteClass::Conversation => &self.conversation,
            RouteClass::Other => &self.default,
        }
    }

    /// Drop idle client state from every route limiter; returns how many
    /// clients are still tracked.
    pub fn retain_recent(&self) -> usize {
        [
            &self.login,
            &self.refresh,
            &self.prompt,
            &self.conversation,
            &self.default,
        ]
        .into_iter()
        .map(|limiter| {
            limiter.retain_recent();
            limiter.tracked_clients()
        })
        .sum()
    }

    /// Check `client` against the limiter for `path`.
    pub fn check(&self, path: &str, client: IpAddr) -> Result<(), ApiError> {
        if !self.enabled {
            return Ok(());
        }
        let limiter = self.limiter(RouteClass::classify(path));
        limiter.check(client).map_err(|retry_after| {
            warn!(client = %client, path, limit = limiter.limit(), "Rate limit exceeded");
            ApiError::RateLimited {
                detail: format!(
                    "Too many requests. Limit: {} per 1 minute",
                    limiter.limit()
                ),
                retry_after,
            }
        })
    }
}

/// Client address from the connection, or loopback when the router is
/// driven without connect info.
fn client_ip(request: &Request) -> IpAddr {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Per-client rate limiting for every route.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    state
        .rate_limits
        .check(request.uri().path(), client_ip(&request))?;
    Ok(next.run(request).await)
}

// ============================================================================
// Tests
// ============================================================================
