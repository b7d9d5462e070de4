//! Per-client request rate limiting.
//!
//! Each client IP gets a pair of sliding windows (burst and sustained). A
//! request is admitted only when both windows have room.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::{AppState, errors::ApiError};
use crate::{config::RateLimitConfig, logging, metrics};

/// Rate limiter using a sliding window algorithm
#[derive(Debug)]
pub struct RateLimiter {
    /// Timestamps of recent requests
    timestamps: VecDeque<Instant>,
    /// Maximum number of requests allowed in the window
    max_requests: usize,
    /// Time window for rate limiting
    window: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Example
    ///
    /// ```
    /// use pw_server::api::rate_limiter::RateLimiter;
    /// use std::time::Duration;
    ///
    /// // Allow 10 requests per second
    /// let limiter = RateLimiter::new(10, Duration::from_secs(1));
    /// ```
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(max_requests.min(1024)),
            max_requests,
            window,
        }
    }

    fn evict(&mut self, now: Instant) {
        while let Some(ts) = self.timestamps.front() {
            if now.duration_since(*ts) > self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Whether a request would currently be admitted, without recording it.
    pub fn has_capacity(&mut self) -> bool {
        self.evict(Instant::now());
        self.timestamps.len() < self.max_requests
    }

    /// Check if a request should be allowed
    ///
    /// Returns `true` if the request is allowed, `false` if rate limit exceeded.
    ///
    /// ```
    /// # use pw_server::api::rate_limiter::RateLimiter;
    /// # use std::time::Duration;
    /// let mut limiter = RateLimiter::new(5, Duration::from_secs(1));
    ///
    /// for _ in 0..5 {
    ///     assert!(limiter.check());
    /// }
    ///
    /// assert!(!limiter.check());
    /// ```
    pub fn check(&mut self) -> bool {
        let now = Instant::now();
        self.evict(now);

        if self.timestamps.len() >= self.max_requests {
            return false;
        }

        self.timestamps.push_back(now);
        true
    }

    /// Get the number of remaining requests allowed in the current window
    pub fn remaining(&self) -> usize {
        self.max_requests.saturating_sub(self.timestamps.len())
    }

    /// Time until the oldest request leaves the window
    pub fn reset_in(&self) -> Option<Duration> {
        self.timestamps.front().map(|oldest| {
            let elapsed = Instant::now().duration_since(*oldest);
            self.window.saturating_sub(elapsed)
        })
    }

    fn is_idle(&self, now: Instant) -> bool {
        self.timestamps
            .back()
            .is_none_or(|last| now.duration_since(*last) > self.window)
    }
}

/// Burst and sustained windows for one client.
#[derive(Debug)]
struct ClientWindows {
    burst: RateLimiter,
    sustained: RateLimiter,
}

impl ClientWindows {
    fn new(config: RateLimitConfig) -> Self {
        Self {
            burst: RateLimiter::new(config.per_second, Duration::from_secs(1)),
            sustained: RateLimiter::new(config.per_minute, Duration::from_secs(60)),
        }
    }

    fn check(&mut self) -> bool {
        // Only record when both windows admit, so a rejected burst does not
        // consume sustained capacity.
        if !(self.burst.has_capacity() && self.sustained.has_capacity()) {
            return false;
        }
        self.burst.check() && self.sustained.check()
    }
}

/// Rate limiter keyed by client IP.
#[derive(Debug)]
pub struct IpRateLimiter {
    config: RateLimitConfig,
    clients: Mutex<HashMap<IpAddr, ClientWindows>>,
}

impl IpRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn trusts_forwarded_for(&self) -> bool {
        self.config.trust_forwarded_for
    }

    /// Record a request from `ip`; `false` when it must be rejected.
    pub async fn check(&self, ip: IpAddr) -> bool {
        let mut clients = self.clients.lock().await;
        clients
            .entry(ip)
            .or_insert_with(|| ClientWindows::new(self.config))
            .check()
    }

    /// Drop clients whose windows have fully drained.
    pub async fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut clients = self.clients.lock().await;
        let before = clients.len();
        clients.retain(|_, windows| !windows.sustained.is_idle(now));
        before - clients.len()
    }
}

/// Resolve the caller's IP.
///
/// The socket peer is the key unless the limiter sits behind a trusted proxy,
/// in which case the address the proxy appended to `x-forwarded-for` is used.
fn client_ip(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trust_forwarded_for: bool,
) -> Option<IpAddr> {
    let peer = connect_info.map(|ConnectInfo(addr)| addr.ip());
    if !trust_forwarded_for {
        return peer;
    }

    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.rsplit(',').next())
        .and_then(|v| v.trim().parse().ok())
        .or(peer)
}

/// Reject clients that exceed their request budget with `429 Too Many Requests`.
///
/// Preflight requests, authentication and the health check are never limited.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if request.method() == Method::OPTIONS || path == "/health" || path.starts_with("/api/auth") {
        return next.run(request).await;
    }

    let ip = client_ip(
        request.headers(),
        request.extensions().get::<ConnectInfo<SocketAddr>>(),
        state.rate_limiter.trusts_forwarded_for(),
    );

    if let Some(ip) = ip {
        if !state.rate_limiter.check(ip).await {
            let path = request.uri().path().to_string();
            let ip = ip.to_string();
            logging::log_security_event("rate_limited", None, Some(&ip), &path);
            metrics::rate_limit_hits_total(&path);
            return ApiError::rate_limited().into_response();
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::thread;

    #[test]
    fn test_rate_limiter_blocks_over_limit() {
        let mut limiter = RateLimiter::new(3, Duration::from_secs(1));

        for _ in 0..3 {
            assert!(limiter.check());
        }

        assert!(!limiter.check(), "Should block request over limit");
    }

    #[test]
    fn test_rate_limiter_window_expiry() {
        let mut limiter = RateLimiter::new(2, Duration::from_millis(100));

        assert!(limiter.check());
        assert!(limiter.check());
        assert!(!limiter.check());

        thread::sleep(Duration::from_millis(150));

        assert!(limiter.check(), "Should allow after window expires");
    }

    #[test]
    fn test_remaining_count() {
        let mut limiter = RateLimiter::new(5, Duration::from_secs(1));
        assert_eq!(limiter.remaining(), 5);

        limiter.check();
        limiter.check();
        assert_eq!(limiter.remaining(), 3);
        assert!(limiter.reset_in().is_some_and(|d| d <= Duration::from_secs(1)));
    }

    #[test]
    fn test_has_capacity_does_not_record() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(1));
        assert!(limiter.has_capacity());
        assert!(limiter.has_capacity());
        assert!(limiter.check());
        assert!(!limiter.has_capacity());
    }

    #[tokio::test]
    async fn test_ip_limiter_isolates_clients() {
        let limiter = IpRateLimiter::new(RateLimitConfig {
            per_second: 2,
            per_minute: 10,
            ..RateLimitConfig::default()
        });
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();

        assert!(limiter.check(a).await);
        assert!(limiter.check(a).await);
        assert!(!limiter.check(a).await);
        assert!(limiter.check(b).await);
    }

    #[tokio::test]
    async fn test_burst_rejection_keeps_sustained_budget() {
        let limiter = IpRateLimiter::new(RateLimitConfig {
            per_second: 1,
            per_minute: 2,
            ..RateLimitConfig::default()
        });
        let ip: IpAddr = "10.0.0.3".parse().unwrap();

        assert!(limiter.check(ip).await);
        assert!(!limiter.check(ip).await);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(limiter.check(ip).await, "second sustained slot still free");
    }

    #[test]
    fn test_client_ip_uses_socket_peer_by_default() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));
        let socket = ConnectInfo("198.51.100.20:5000".parse::<SocketAddr>().unwrap());

        assert_eq!(
            client_ip(&headers, Some(&socket), false),
            Some("198.51.100.20".parse().unwrap())
        );
        assert_eq!(client_ip(&headers, None, false), None);
    }

    #[test]
    fn test_client_ip_behind_trusted_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("10.9.9.9, 203.0.113.9"),
        );
        let socket = ConnectInfo("127.0.0.1:5000".parse::<SocketAddr>().unwrap());

        assert_eq!(
            client_ip(&headers, Some(&socket), true),
            Some("203.0.113.9".parse().unwrap())
        );
        assert_eq!(
            client_ip(&HeaderMap::new(), Some(&socket), true),
            Some("127.0.0.1".parse().unwrap())
        );
    }
}
