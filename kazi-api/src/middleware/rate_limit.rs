//! Rate limiting middleware.
//!
//! One `governor` limiter per caller, held in a `DashMap`. Authenticated
//! callers are keyed by principal, everyone else by client IP. Proxy
//! headers only count when `trust_proxy_headers` is set. Every response
//! carries `x-ratelimit-limit` and `x-ratelimit-remaining`; a rejected
//! request gets 429 with `retry-after`.
//!
//! Once more than `rate_limit_max_keys` callers are tracked, limiters idle
//! long enough to have refilled completely are dropped.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::HeaderName, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use governor::{
    clock::{Clock, DefaultClock},
    middleware::StateInformationMiddleware,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use kazi_core::OwnerId;

use crate::auth::AuthConfig;
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::telemetry::METRICS;

use super::auth::authenticate_headers;

pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";

type DirectRateLimiter =
    RateLimiter<NotKeyed, InMemoryState, DefaultClock, StateInformationMiddleware>;

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum RateLimitKey {
    Ip(IpAddr),
    Principal(OwnerId),
}

impl RateLimitKey {
    fn kind(&self) -> &'static str {
        match self {
            RateLimitKey::Ip(_) => "ip",
            RateLimitKey::Principal(_) => "principal",
        }
    }
}

struct Bucket {
    limiter: Arc<DirectRateLimiter>,
    /// Seconds since `RateLimitState::started`.
    last_seen: AtomicU64,
}

#[derive(Clone)]
pub struct RateLimitState {
    config: Arc<ApiConfig>,
    auth_config: Arc<AuthConfig>,
    limiters: Arc<DashMap<RateLimitKey, Bucket>>,
    started: Instant,
}

impl RateLimitState {
    pub fn new(config: Arc<ApiConfig>, auth_config: Arc<AuthConfig>) -> Self {
        Self {
            config,
            auth_config,
            limiters: Arc::new(DashMap::new()),
            started: Instant::now(),
        }
    }

    pub fn tracked_keys(&self) -> usize {
        self.limiters.len()
    }

    /// Requests per minute allowed for a key.
    pub fn limit_for(&self, key: &RateLimitKey) -> u32 {
        match key {
            RateLimitKey::Ip(_) => self.config.rate_limit_unauthenticated,
            RateLimitKey::Principal(_) => self.config.rate_limit_authenticated,
        }
    }

    fn limiter(&self, key: &RateLimitKey) -> Arc<DirectRateLimiter> {
        let now = self.elapsed_secs();
        let mut inserted = false;
        let limiter = {
            let bucket = self.limiters.entry(key.clone()).or_insert_with(|| {
                inserted = true;
                Bucket {
                    limiter: Arc::new(self.new_limiter(key)),
                    last_seen: AtomicU64::new(now),
                }
            });
            bucket.last_seen.store(now, Ordering::Relaxed);
            bucket.limiter.clone()
        };
        // The entry guard is released above; `retain` locks every shard.
        if inserted && self.limiters.len() > self.config.rate_limit_max_keys {
            self.prune_idle();
        }
        limiter
    }

    fn new_limiter(&self, key: &RateLimitKey) -> DirectRateLimiter {
        let limit = NonZeroU32::new(self.limit_for(key)).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(self.config.rate_limit_burst).unwrap_or(NonZeroU32::MIN);
        RateLimiter::direct(Quota::per_minute(limit).allow_burst(burst))
            .with_middleware::<StateInformationMiddleware>()
    }

    /// Idle time after which a limiter is back at full burst, so dropping
    /// it changes nothing for the caller. Never below `rate_limit_window`.
    fn idle_after(&self) -> Duration {
        let slowest = self
            .config
            .rate_limit_unauthenticated
            .min(self.config.rate_limit_authenticated)
            .max(1);
        let refill = (60 * u64::from(self.config.rate_limit_burst.max(1))).div_ceil(u64::from(slowest));
        self.config.rate_limit_window.max(Duration::from_secs(refill))
    }

    /// Drop limiters idle for at least `idle_after`. Returns how many went.
    pub fn prune_idle(&self) -> usize {
        self.prune_idle_at(self.elapsed_secs())
    }

    fn prune_idle_at(&self, now: u64) -> usize {
        let idle = self.idle_after().as_secs();
        let before = self.limiters.len();
        self.limiters
            .retain(|_, bucket| now.saturating_sub(bucket.last_seen.load(Ordering::Relaxed)) < idle);
        let pruned = before.saturating_sub(self.limiters.len());
        tracing::debug!(pruned, remaining = self.limiters.len(), "Pruned idle rate limiters");
        pruned
    }

    fn elapsed_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// Principal when the request carries valid credentials, else client IP.
    ///
    /// Runs before `auth_middleware`, so invalid credentials fall back to
    /// the IP bucket and are rejected later by auth.
    fn key_for(&self, request: &Request) -> RateLimitKey {
        match authenticate_headers(&self.auth_config, request.headers()) {
            Ok(ctx) => RateLimitKey::Principal(ctx.principal),
            Err(_) => RateLimitKey::Ip(client_ip(request, self.config.trust_proxy_headers)),
        }
    }
}

pub struct RateLimitError {
    pub limit: u32,
    pub retry_after: u64,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let mut response = ApiError::too_many_requests(Some(self.retry_after)).into_response();
        let headers = response.headers_mut();
        set_header(headers, RATE_LIMIT_LIMIT_HEADER, self.limit.into());
        set_header(headers, RATE_LIMIT_REMAINING_HEADER, 0);
        set_header(headers, "retry-after", self.retry_after);
        response
    }
}

fn set_header(headers: &mut HeaderMap, name: &'static str, value: u64) {
    if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

/// Client IP from the socket address, or from proxy headers first when the
/// deployment trusts them.
fn client_ip(request: &Request, trust_proxy_headers: bool) -> IpAddr {
    if trust_proxy_headers {
        if let Some(ip) = forwarded_ip(request.headers()) {
            return ip;
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse().ok());
    forwarded.or_else(|| {
        headers
            .get("x-real-ip")
            .and_then(|h| h.to_str().ok())
            .and_then(|ip| ip.trim().parse().ok())
    })
}

pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitError> {
    if !state.config.rate_limit_enabled {
        return Ok(next.run(request).await);
    }

    let key = state.key_for(&request);
    let limit = state.limit_for(&key);

    match state.limiter(&key).check() {
        Ok(snapshot) => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            set_header(headers, RATE_LIMIT_LIMIT_HEADER, limit.into());
            set_header(
                headers,
                RATE_LIMIT_REMAINING_HEADER,
                snapshot.remaining_burst_capacity().into(),
            );
            Ok(response)
        }
        Err(not_until) => {
            let retry_after = not_until
                .wait_time_from(DefaultClock::default().now())
                .as_secs()
                .max(1);
            if let Ok(metrics) = METRICS.as_ref() {
                metrics.record_rate_limited(key.kind());
            }
            tracing::warn!(kind = key.kind(), retry_after, "Rate limit exceeded");
            Err(RateLimitError { limit, retry_after })
        }
    }
}
