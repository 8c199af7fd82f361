//! Per client IP rate limiting using a token bucket per address.
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use governor::{
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use log::*;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::controller::StatusResponse;

static X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Token bucket entry for an IP address
struct TokenBucket {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    /// Last access time (for cleanup)
    last_access: Instant,
}

/// Rate limiter state shared across requests
pub struct RateLimitState {
    buckets: DashMap<IpAddr, TokenBucket>,
    /// `None` when rate limiting is disabled
    quota: Option<Quota>,
    clock: DefaultClock,
}

impl RateLimitState {
    /// Allows `per_minute` requests per IP per minute; 0 disables limiting.
    pub fn new(per_minute: u32) -> Self {
        Self {
            buckets: DashMap::new(),
            quota: NonZeroU32::new(per_minute).map(Quota::per_minute),
            clock: DefaultClock::default(),
        }
    }

    /// Takes one token for `ip`, or returns how long until the next one is available.
    pub fn check(&self, ip: IpAddr) -> Result<(), Duration> {
        let Some(quota) = self.quota else {
            return Ok(());
        };

        let mut bucket = self.buckets.entry(ip).or_insert_with(|| {
            debug!("Creating new rate limit bucket for {ip}");
            TokenBucket {
                limiter: RateLimiter::direct(quota),
                last_access: Instant::now(),
            }
        });
        bucket.last_access = Instant::now();

        bucket
            .limiter
            .check()
            .map_err(|not_until| not_until.wait_time_from(self.clock.now()))
    }

    /// Forgets buckets not used for `max_age`. Returns how many were removed.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| bucket.last_access.elapsed() <= max_age);
        before - self.buckets.len()
    }
}

/// Spawns the periodic cleanup of idle buckets.
pub fn spawn_cleanup(state: Arc<RateLimitState>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let removed = state.cleanup(every);
            if removed > 0 {
                trace!("Removed {removed} idle rate limit bucket(s)");
            }
        }
    })
}

/// The address a request is attributed to. The relay runs behind a proxy, so the
/// first `X-Forwarded-For` hop wins over the socket peer address.
fn client_ip(request: &Request) -> IpAddr {
    let forwarded = request
        .headers()
        .get(X_FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse().ok());

    forwarded
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Middleware rejecting requests over the per IP quota with 429 Too Many Requests.
pub async fn rate_limit(
    State(state): State<Arc<RateLimitState>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&request);

    match state.check(ip) {
        Ok(()) => next.run(request).await,
        Err(wait) => {
            let retry_secs = wait.as_secs().max(1);
            warn!("Rate limit exceeded for {ip}, retry in {retry_secs}s");

            let message = format!("Rate limit exceeded, retry in {retry_secs} seconds");
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(StatusResponse::error(&message)),
            )
                .into_response();
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_secs));
            response
        }
    }
}
