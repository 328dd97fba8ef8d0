/*!
 * # Rate Limiting
 *
 * Per-IP admission control in front of every externally reachable route.
 *
 * Three fixed-window policies run independently for each client:
 *
 * - `general`: every non-exempt route
 * - `auth`: login and registration prefixes
 * - `password_reset`: reset-request prefixes
 *
 * A request to a classified route is checked against its class policy first
 * and then against `general`. Counters live in a sharded in-memory map, or in
 * Redis (`INCR` + `EXPIRE`) with the in-memory map as fallback when Redis is
 * unreachable. Limited requests are answered immediately with `429`; nothing
 * is queued.
 */

use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::{HeaderMap, HeaderValue, Response},
    response::IntoResponse,
};
use dashmap::DashMap;
use metrics::counter;
use redis::AsyncCommands;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::{split_list, RateLimitSettings};
use crate::errors::ServiceError;

const UNKNOWN_CLIENT: &str = "unknown";

fn num_to_header_value<T: ToString>(n: T) -> HeaderValue {
    HeaderValue::from_str(&n.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Policy {
    General,
    Auth,
    PasswordReset,
}

impl Policy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Policy::General => "general",
            Policy::Auth => "auth",
            Policy::PasswordReset => "password_reset",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyLimits {
    pub max_requests: u32,
    pub window: Duration,
}

/// Resolved policy table and route classification.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub general: PolicyLimits,
    pub auth: PolicyLimits,
    pub password_reset: PolicyLimits,
    pub auth_prefixes: Vec<String>,
    pub password_reset_prefixes: Vec<String>,
    pub exempt_prefixes: Vec<String>,
    pub enable_headers: bool,
    /// Take the client address from `X-Forwarded-For`/`X-Real-IP`. Only
    /// safe behind a proxy that overwrites them.
    pub trust_forwarded_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::from_settings(&RateLimitSettings::default())
    }
}

impl RateLimitConfig {
    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        Self {
            general: PolicyLimits {
                max_requests: settings.general_max_requests,
                window: settings.general_window(),
            },
            auth: PolicyLimits {
                max_requests: settings.auth_max_requests,
                window: settings.auth_window(),
            },
            password_reset: PolicyLimits {
                max_requests: settings.password_reset_max_requests,
                window: settings.password_reset_window(),
            },
            auth_prefixes: split_list(&settings.auth_path_prefixes),
            password_reset_prefixes: split_list(&settings.password_reset_path_prefixes),
            exempt_prefixes: split_list(&settings.exempt_path_prefixes),
            enable_headers: settings.enable_headers,
            trust_forwarded_headers: settings.trust_forwarded_headers,
        }
    }

    pub fn limits(&self, policy: Policy) -> PolicyLimits {
        match policy {
            Policy::General => self.general,
            Policy::Auth => self.auth,
            Policy::PasswordReset => self.password_reset,
        }
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }

    /// The stricter policy a path falls under, if any.
    pub fn classify(&self, path: &str) -> Option<Policy> {
        let matches = |prefixes: &[String]| prefixes.iter().any(|p| path.starts_with(p.as_str()));
        if matches(&self.password_reset_prefixes) {
            Some(Policy::PasswordReset)
        } else if matches(&self.auth_prefixes) {
            Some(Policy::Auth)
        } else {
            None
        }
    }
}

/// Bucket key: `ip:<addr>:<policy>`.
pub fn bucket_key(ip: &str, policy: Policy) -> String {
    format!("ip:{}:{}", ip, policy.as_str())
}

#[derive(Debug, Clone)]
struct Bucket {
    count: u32,
    window_start: Instant,
    window: Duration,
}

impl Bucket {
    fn new(now: Instant, window: Duration) -> Self {
        Self {
            count: 0,
            window_start: now,
            window,
        }
    }

    /// Counts the request unless the window is already full. A rejected
    /// request leaves the count untouched.
    fn hit(&mut self, limits: PolicyLimits, now: Instant) -> RateLimitResult {
        self.window = limits.window;
        if now.saturating_duration_since(self.window_start) >= limits.window {
            self.window_start = now;
            self.count = 0;
        }

        let reset_after = limits
            .window
            .saturating_sub(now.saturating_duration_since(self.window_start));
        if self.count >= limits.max_requests {
            return RateLimitResult {
                allowed: false,
                limit: limits.max_requests,
                remaining: 0,
                count: self.count,
                reset_after,
            };
        }

        self.count += 1;
        RateLimitResult {
            allowed: true,
            limit: limits.max_requests,
            remaining: limits.max_requests - self.count,
            count: self.count,
            reset_after,
        }
    }

    fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) >= self.window
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Requests counted in the current window
    pub count: u32,
    pub reset_after: Duration,
}

impl RateLimitResult {
    /// Seconds until the window resets, rounded up so clients never retry early.
    pub fn reset_secs(&self) -> u64 {
        let secs = self.reset_after.as_secs();
        if self.reset_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}

#[derive(Clone, Default)]
pub enum RateLimitBackend {
    #[default]
    InMemory,
    Redis {
        client: Arc<redis::Client>,
        namespace: String,
    },
}

impl RateLimitBackend {
    pub fn from_settings(settings: &RateLimitSettings) -> Self {
        if !settings.use_redis {
            return Self::InMemory;
        }
        match redis::Client::open(settings.redis_url.as_str()) {
            Ok(client) => Self::Redis {
                client: Arc::new(client),
                namespace: settings.namespace.clone(),
            },
            Err(err) => {
                warn!(error = %err, "invalid redis url for rate limiting; counting in memory");
                Self::InMemory
            }
        }
    }
}

#[derive(Clone)]
enum RateLimitStore {
    InMemory {
        buckets: Arc<DashMap<String, Bucket>>,
    },
    Redis {
        client: Arc<redis::Client>,
        namespace: String,
        fallback: Arc<DashMap<String, Bucket>>,
    },
}

impl RateLimitStore {
    fn local(&self) -> &DashMap<String, Bucket> {
        match self {
            RateLimitStore::InMemory { buckets } => buckets,
            RateLimitStore::Redis { fallback, .. } => fallback,
        }
    }
}

/// Where a request was counted, so a refund goes to the same place.
#[derive(Debug, Clone, Copy)]
enum CountedIn {
    Local,
    Redis,
}

#[derive(Clone)]
pub struct RateLimiter {
    store: RateLimitStore,
    config: Arc<RateLimitConfig>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig, backend: RateLimitBackend) -> Self {
        let store = match backend {
            RateLimitBackend::InMemory => RateLimitStore::InMemory {
                buckets: Arc::new(DashMap::new()),
            },
            RateLimitBackend::Redis { client, namespace } => RateLimitStore::Redis {
                client,
                namespace,
                fallback: Arc::new(DashMap::new()),
            },
        };

        Self {
            store,
            config: Arc::new(config),
        }
    }

    pub fn in_memory(config: RateLimitConfig) -> Self {
        Self::new(config, RateLimitBackend::InMemory)
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// In-memory check at an explicit instant. The entry lock makes the
    /// read-modify-write atomic per key.
    pub fn check_at(&self, key: &str, policy: Policy, now: Instant) -> RateLimitResult {
        let limits = self.config.limits(policy);
        let mut bucket = self
            .store
            .local()
            .entry(key.to_string())
            .or_insert_with(|| Bucket::new(now, limits.window));
        bucket.hit(limits, now)
    }

    pub async fn check(&self, key: &str, policy: Policy) -> RateLimitResult {
        self.hit(key, policy).await.0
    }

    async fn hit(&self, key: &str, policy: Policy) -> (RateLimitResult, CountedIn) {
        match &self.store {
            RateLimitStore::InMemory { .. } => {
                (self.check_at(key, policy, Instant::now()), CountedIn::Local)
            }
            RateLimitStore::Redis {
                client, namespace, ..
            } => {
                let limits = self.config.limits(policy);
                let result = match client.get_async_connection().await {
                    Ok(mut conn) => Self::check_with_redis(&mut conn, namespace, key, limits).await,
                    Err(err) => Err(err),
                };
                match result {
                    Ok(result) => (result, CountedIn::Redis),
                    Err(err) => {
                        warn!(
                            error = %err,
                            "redis rate limiting unavailable; using in-memory fallback"
                        );
                        (self.check_at(key, policy, Instant::now()), CountedIn::Local)
                    }
                }
            }
        }
    }

    /// Gives back one request counted in the local bucket for `key`.
    pub fn release_at(&self, key: &str) {
        if let Some(mut bucket) = self.store.local().get_mut(key) {
            bucket.count = bucket.count.saturating_sub(1);
        }
    }

    async fn release(&self, key: &str, counted: CountedIn) {
        match (counted, &self.store) {
            (
                CountedIn::Redis,
                RateLimitStore::Redis {
                    client, namespace, ..
                },
            ) => {
                let redis_key = format!("{}:{}", namespace, key);
                let released = match client.get_async_connection().await {
                    Ok(mut conn) => conn.decr::<_, _, i64>(&redis_key, 1).await.map(|_| ()),
                    Err(err) => Err(err),
                };
                if let Err(err) = released {
                    warn!(error = %err, key, "could not release rate limit count");
                }
            }
            _ => self.release_at(key),
        }
    }

    async fn check_with_redis<C>(
        conn: &mut C,
        namespace: &str,
        key: &str,
        limits: PolicyLimits,
    ) -> Result<RateLimitResult, redis::RedisError>
    where
        C: redis::aio::ConnectionLike + Send,
    {
        let redis_key = format!("{}:{}", namespace, key);
        let window_secs = limits.window.as_secs().max(1);

        let count: i64 = conn.incr(&redis_key, 1).await?;
        if count == 1 {
            conn.expire::<_, ()>(&redis_key, window_secs as usize).await?;
        }
        let ttl: i64 = conn.ttl(&redis_key).await?;
        if ttl < 0 {
            // Key lost its expiry (e.g. EXPIRE failed after INCR).
            conn.expire::<_, ()>(&redis_key, window_secs as usize).await?;
        }
        let ttl_secs = if ttl > 0 { ttl as u64 } else { window_secs };

        let count = u32::try_from(count.max(0)).unwrap_or(u32::MAX);
        let allowed = count <= limits.max_requests;
        Ok(RateLimitResult {
            allowed,
            limit: limits.max_requests,
            remaining: limits.max_requests.saturating_sub(count),
            count: count.min(limits.max_requests),
            reset_after: Duration::from_secs(ttl_secs),
        })
    }

    /// Runs the policies governing `path` for a client. Returns `None` for
    /// exempt paths, otherwise the deciding result: the first rejection, or
    /// the tighter of the allowed results. A request rejected by any policy
    /// is not counted against the others.
    pub async fn check_request(&self, ip: &str, path: &str) -> Option<(Policy, RateLimitResult)> {
        if self.config.is_exempt(path) {
            return None;
        }

        let mut decided: Option<(Policy, RateLimitResult)> = None;
        let mut counted: Vec<(String, CountedIn)> = Vec::with_capacity(2);
        let policies = self
            .config
            .classify(path)
            .into_iter()
            .chain(std::iter::once(Policy::General));
        for policy in policies {
            let key = bucket_key(ip, policy);
            let (result, counted_in) = self.hit(&key, policy).await;
            if !result.allowed {
                for (key, counted_in) in counted {
                    self.release(&key, counted_in).await;
                }
                return Some((policy, result));
            }
            counted.push((key, counted_in));
            decided = match decided {
                Some((_, prev)) if prev.remaining <= result.remaining => decided,
                _ => Some((policy, result)),
            };
        }
        decided
    }

    /// Drops buckets whose window has passed.
    pub fn cleanup_expired(&self, now: Instant) -> usize {
        let buckets = self.store.local();
        let before = buckets.len();
        buckets.retain(|_, bucket| !bucket.expired(now));
        before.saturating_sub(buckets.len())
    }

    pub fn tracked_keys(&self) -> usize {
        self.store.local().len()
    }
}

/// Client address: when forwarded headers are trusted, the first
/// `X-Forwarded-For` hop, then `X-Real-IP`; otherwise the socket peer.
pub fn client_ip(request: &Request, trust_forwarded: bool) -> String {
    if trust_forwarded {
        if let Some(ip) = forwarded_ip(request.headers()) {
            return ip;
        }
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let first_hop = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    if let Some(ip) = first_hop {
        return Some(ip.to_string());
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

fn apply_headers(headers: &mut HeaderMap, result: &RateLimitResult) {
    headers.insert("X-RateLimit-Limit", num_to_header_value(result.limit));
    headers.insert("X-RateLimit-Remaining", num_to_header_value(result.remaining));
    headers.insert("X-RateLimit-Reset", num_to_header_value(result.reset_secs()));
}

// Layer implementation for tower
#[derive(Clone)]
pub struct RateLimitLayer {
    rate_limiter: RateLimiter,
}

impl RateLimitLayer {
    pub fn new(rate_limiter: RateLimiter) -> Self {
        Self { rate_limiter }
    }
}

impl<S> tower::Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            rate_limiter: self.rate_limiter.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    rate_limiter: RateLimiter,
}

impl<S> tower::Service<Request> for RateLimitService<S>
where
    S: tower::Service<Request, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let rate_limiter = self.rate_limiter.clone();
        // Take the service that was driven to readiness, leave a fresh clone.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let path = request.uri().path().to_string();
            let ip = client_ip(&request, rate_limiter.config().trust_forwarded_headers);

            let Some((policy, result)) = rate_limiter.check_request(&ip, &path).await else {
                return inner.call(request).await;
            };
            let enable_headers = rate_limiter.config().enable_headers;

            if !result.allowed {
                warn!(client = %ip, policy = policy.as_str(), %path, "rate limit exceeded");
                counter!("rate_limit_denied_total", 1, "policy" => policy.as_str());

                let mut response = ServiceError::RateLimited.into_response();
                let headers = response.headers_mut();
                if enable_headers {
                    apply_headers(headers, &result);
                }
                headers.insert("Retry-After", num_to_header_value(result.reset_secs().max(1)));
                return Ok(response);
            }

            counter!("rate_limit_allowed_total", 1, "policy" => policy.as_str());
            let mut response = inner.call(request).await?;
            if enable_headers {
                apply_headers(response.headers_mut(), &result);
            }
            Ok(response)
        })
    }
}

/// Periodically sweeps expired buckets.
pub async fn start_cleanup_task(rate_limiter: RateLimiter, interval: Duration) {
    let mut interval_timer = tokio::time::interval(interval);

    loop {
        interval_timer.tick().await;
        let removed = rate_limiter.cleanup_expired(Instant::now());
        debug!(removed, remaining = rate_limiter.tracked_keys(), "rate limiter cleanup completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use http::StatusCode;
    use tower::ServiceExt;

    fn config() -> RateLimitConfig {
        RateLimitConfig::default()
    }

    #[test]
    fn first_request_counts_as_one() {
        let limiter = RateLimiter::in_memory(config());
        let result = limiter.check_at("ip:1.2.3.4:auth", Policy::Auth, Instant::now());
        assert!(result.allowed);
        assert_eq!(result.count, 1);
        assert_eq!(result.remaining, 9);
    }

    #[test]
    fn eleventh_auth_request_is_rejected_until_window_elapses() {
        let limiter = RateLimiter::in_memory(config());
        let key = bucket_key("10.0.0.1", Policy::Auth);
        let start = Instant::now();

        // The first request opens the window at `start`.
        for i in 0..10 {
            let r = limiter.check_at(&key, Policy::Auth, start + Duration::from_secs(i));
            assert!(r.allowed, "request {} should pass", i + 1);
        }
        let rejected = limiter.check_at(&key, Policy::Auth, start + Duration::from_secs(11));
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);
        // A rejection does not consume quota.
        assert_eq!(rejected.count, 10);

        let window = Duration::from_secs(300);
        let edge = limiter.check_at(&key, Policy::Auth, start + window - Duration::from_nanos(1));
        assert!(!edge.allowed);

        let later = limiter.check_at(&key, Policy::Auth, start + window);
        assert!(later.allowed);
        assert_eq!(later.count, 1);
    }

    #[tokio::test]
    async fn general_rejection_does_not_spend_class_quota() {
        let mut cfg = config();
        cfg.general.max_requests = 2;
        let limiter = RateLimiter::in_memory(cfg);
        let ip = "192.0.2.10";

        for _ in 0..2 {
            let (_, result) = limiter.check_request(ip, "/api/v1/cart").await.unwrap();
            assert!(result.allowed);
        }
        for _ in 0..3 {
            let (policy, result) = limiter.check_request(ip, "/api/v1/auth/login").await.unwrap();
            assert_eq!(policy, Policy::General);
            assert!(!result.allowed);
        }

        let auth = limiter.check_at(&bucket_key(ip, Policy::Auth), Policy::Auth, Instant::now());
        assert!(auth.allowed);
        assert_eq!(auth.count, 1);
    }

    #[tokio::test]
    async fn class_rejection_leaves_general_untouched() {
        let mut cfg = config();
        cfg.auth.max_requests = 1;
        let limiter = RateLimiter::in_memory(cfg);
        let ip = "192.0.2.11";

        limiter.check_request(ip, "/api/v1/auth/login").await.unwrap();
        let (policy, rejected) = limiter.check_request(ip, "/api/v1/auth/login").await.unwrap();
        assert_eq!(policy, Policy::Auth);
        assert!(!rejected.allowed);

        let general =
            limiter.check_at(&bucket_key(ip, Policy::General), Policy::General, Instant::now());
        assert_eq!(general.count, 2);
    }

    #[test]
    fn forwarded_headers_are_ignored_unless_trusted() {
        let request = || {
            http::Request::builder()
                .uri("/api/v1/cart")
                .header("x-forwarded-for", "203.0.113.7")
                .body(Body::empty())
                .unwrap()
        };
        assert_eq!(client_ip(&request(), false), UNKNOWN_CLIENT);
        assert_eq!(client_ip(&request(), true), "203.0.113.7");

        let mut with_peer = request();
        with_peer
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([198, 51, 100, 9], 4000))));
        assert_eq!(client_ip(&with_peer, false), "198.51.100.9");
    }

    #[test]
    fn policies_count_independently() {
        let limiter = RateLimiter::in_memory(config());
        let now = Instant::now();
        for _ in 0..10 {
            limiter.check_at(&bucket_key("a", Policy::Auth), Policy::Auth, now);
        }
        let general = limiter.check_at(&bucket_key("a", Policy::General), Policy::General, now);
        assert!(general.allowed);
        assert_eq!(general.count, 1);
    }

    #[test]
    fn classification_and_exemptions() {
        let cfg = config();
        assert_eq!(cfg.classify("/api/v1/auth/login"), Some(Policy::Auth));
        assert_eq!(
            cfg.classify("/api/v1/auth/forgot-password"),
            Some(Policy::PasswordReset)
        );
        assert_eq!(cfg.classify("/api/v1/cart"), None);
        assert!(cfg.is_exempt("/health"));
        assert!(!cfg.is_exempt("/api/v1/orders"));
    }

    #[test]
    fn expired_buckets_are_swept() {
        let limiter = RateLimiter::in_memory(config());
        let start = Instant::now();
        limiter.check_at("k1", Policy::Auth, start);
        limiter.check_at("k2", Policy::General, start);

        let removed = limiter.cleanup_expired(start + Duration::from_secs(301));
        assert_eq!(removed, 1);
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn forwarded_for_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(forwarded_ip(&headers).as_deref(), Some("9.9.9.9"));
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(forwarded_ip(&headers).as_deref(), Some("203.0.113.7"));
    }

    #[tokio::test]
    async fn layer_rejects_with_envelope_and_headers() {
        let mut cfg = config();
        cfg.auth.max_requests = 2;
        cfg.trust_forwarded_headers = true;
        let app = Router::new()
            .route("/api/v1/auth/login", get(|| async { "ok" }))
            .route("/health", get(|| async { "ok" }))
            .layer(RateLimitLayer::new(RateLimiter::in_memory(cfg)));

        let request = || {
            http::Request::builder()
                .uri("/api/v1/auth/login")
                .header("x-forwarded-for", "198.51.100.4")
                .body(Body::empty())
                .unwrap()
        };

        let first = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers()["X-RateLimit-Limit"], "2");
        assert_eq!(first.headers()["X-RateLimit-Remaining"], "1");

        app.clone().oneshot(request()).await.unwrap();
        let third = app.clone().oneshot(request()).await.unwrap();
        assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(third.headers().contains_key("Retry-After"));
        assert_eq!(third.headers()["X-RateLimit-Remaining"], "0");

        let body = axum::body::to_bytes(third.into_body(), usize::MAX).await.unwrap();
        let payload: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload["code"], "rate_limited");
        assert_eq!(payload["status"], "fail");

        let health = app
            .oneshot(http::Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(health.status(), StatusCode::OK);
        assert!(!health.headers().contains_key("X-RateLimit-Limit"));
    }
}
