//! Fixed-window rate limiting middleware.
//!
//! # Responsibilities
//! - Count requests per caller key (client network address by default)
//! - Reject with 429 once a window's budget is spent
//! - Echo limit/remaining/reset metadata on every decision
//!
//! # Design Decisions
//! - Buckets are process-local; behind a load balancer the effective global
//!   limit is roughly `max × instance_count`. That under-enforcement is a
//!   documented property of this limiter, not a bug to hide
//! - Buckets reset lazily when their window has elapsed; a sweep running at
//!   most once per window drops keys that went quiet, keeping the map
//!   bounded by the set of recently active callers

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{GatewayError, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING, X_RATELIMIT_RESET};
use crate::observability::metrics;

/// Outcome of one `allow` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix seconds at which the current window ends.
    pub reset_at: u64,
}

struct Bucket {
    count: u32,
    reset_at: SystemTime,
}

/// Per-key fixed-window request counter.
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
    max: u32,
    window: Duration,
    /// Unix seconds of the last stale-key sweep.
    last_sweep: AtomicU64,
    /// Endpoint class label for metrics ("auth" / "api").
    class: &'static str,
}

impl RateLimiter {
    pub fn new(class: &'static str, max: u32, window: Duration) -> Self {
        Self {
            buckets: DashMap::new(),
            max,
            window,
            last_sweep: AtomicU64::new(0),
            class,
        }
    }

    pub fn allow(&self, key: &str) -> RateDecision {
        self.allow_at(key, SystemTime::now())
    }

    /// Drop buckets whose window has fully elapsed. At most one caller per
    /// window pays for the scan; everyone else sees the fast path.
    fn sweep(&self, now: SystemTime) {
        let now_secs = now
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let last = self.last_sweep.load(Ordering::Relaxed);
        if now_secs < last.saturating_add(self.window.as_secs()) {
            return;
        }
        if self
            .last_sweep
            .compare_exchange(last, now_secs, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            self.buckets.retain(|_, bucket| now <= bucket.reset_at);
        }
    }

    fn allow_at(&self, key: &str, now: SystemTime) -> RateDecision {
        // Must run before the entry guard below; retain would deadlock on
        // a shard already held by this thread
        self.sweep(now);

        let mut bucket = self.buckets.entry(key.to_string()).or_insert_with(|| Bucket {
            count: 0,
            reset_at: now + self.window,
        });

        if now > bucket.reset_at {
            bucket.count = 0;
            bucket.reset_at = now + self.window;
        }

        bucket.count += 1;

        RateDecision {
            allowed: bucket.count <= self.max,
            limit: self.max,
            remaining: self.max.saturating_sub(bucket.count),
            reset_at: bucket
                .reset_at
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }
}

/// Middleware enforcing a limiter keyed on the client address.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = addr.ip().to_string();
    let decision = limiter.allow(&key);

    if !decision.allowed {
        tracing::warn!(client = %key, class = limiter.class, "Rate limit exceeded");
        metrics::record_rate_limited(limiter.class);
        return GatewayError::RateLimited {
            limit: decision.limit,
            remaining: decision.remaining,
            reset_at: decision.reset_at,
        }
        .into_response();
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(X_RATELIMIT_LIMIT, decision.limit.into());
    headers.insert(X_RATELIMIT_REMAINING, decision.remaining.into());
    headers.insert(X_RATELIMIT_RESET, decision.reset_at.into());
    response
}
