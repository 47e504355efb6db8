//! Per-IP rate limiting (SPEC_FULL §4.10 last paragraph): when enabled,
//! caps each client IP at `max_requests_per_minute` authenticated
//! requests, returning `SlowDown`/503 with `Retry-After` on overflow.
//!
//! Grounded on the same `dashmap`-backed counter shape as
//! [`crate::middleware::auth::FailureTracker`] — a fixed one-minute
//! window reset rather than a token bucket, which is sufficient for
//! the coarse per-IP cap this spec asks for.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;

use crate::error::ProxyError;
use crate::state::AppState;

const WINDOW: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct RateLimiter {
    counters: Arc<DashMap<IpAddr, Window>>,
    max_requests_per_minute: u32,
    enabled: bool,
}

#[derive(Clone, Copy)]
struct Window {
    count: u32,
    started_at: Instant,
}

impl RateLimiter {
    pub fn new(enabled: bool, max_requests_per_minute: u32) -> Self {
        Self {
            counters: Arc::new(DashMap::new()),
            max_requests_per_minute,
            enabled,
        }
    }

    /// Returns `Ok(())` if `ip` is under quota (and records the hit),
    /// or `Err(retry_after_seconds)` if the quota is exceeded.
    pub fn check(&self, ip: IpAddr) -> Result<(), u64> {
        if !self.enabled {
            return Ok(());
        }

        let now = Instant::now();
        let mut entry = self.counters.entry(ip).or_insert(Window {
            count: 0,
            started_at: now,
        });

        if now.duration_since(entry.started_at) >= WINDOW {
            entry.count = 0;
            entry.started_at = now;
        }

        entry.count += 1;
        if entry.count > self.max_requests_per_minute {
            let elapsed = now.duration_since(entry.started_at);
            let retry_after = WINDOW.saturating_sub(elapsed).as_secs().max(1);
            return Err(retry_after);
        }
        Ok(())
    }
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<std::net::SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, ProxyError> {
    let ip = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
        .or_else(|| connect_info.map(|c| c.0.ip()))
        .unwrap_or(IpAddr::from([0, 0, 0, 0]));

    match state.rate_limiter.check(ip) {
        Ok(()) => Ok(next.run(request).await),
        Err(retry_after) => {
            tracing::warn!(%ip, retry_after, "rate limit exceeded");
            let mut response = ProxyError::RateLimited.into_response();
            response.headers_mut().insert(
                "retry-after",
                HeaderValue::from_str(&retry_after.to_string())
                    .unwrap_or_else(|_| HeaderValue::from_static("60")),
            );
            Ok(response)
        }
    }
}
