use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics::counter;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::{AppError, ErrorCode};

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Tokens added per second.
    pub per_second: f64,
    /// Bucket capacity.
    pub burst: u32,
    pub sweep_interval: Duration,
    /// Buckets untouched for this long are evicted by the sweep.
    pub idle_timeout: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: 5.0,
            burst: 10,
            sweep_interval: Duration::from_secs(300),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

impl TokenBucket {
    fn full(burst: u32, now: Instant) -> Self {
        Self {
            tokens: f64::from(burst),
            last_refill: now,
            last_seen: now,
        }
    }

    fn try_take(&mut self, now: Instant, per_second: f64, burst: u32) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * per_second).min(f64::from(burst));
        self.last_refill = now;
        self.last_seen = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-client token-bucket limiter.
///
/// The idle sweep runs on a task owned by the limiter: it stops on
/// [`RateLimiter::shutdown`] or once the limiter is dropped.
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<String, Arc<Mutex<TokenBucket>>>>,
    shutdown: CancellationToken,
}

impl RateLimiter {
    /// Builds a limiter without a sweep task. Buckets are only evicted by
    /// explicit [`RateLimiter::sweep`] calls.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Builds a limiter and spawns its sweep task. Must be called inside a
    /// tokio runtime.
    pub fn start(config: RateLimitConfig) -> Arc<Self> {
        let limiter = Arc::new(Self::new(config));
        let weak = Arc::downgrade(&limiter);
        let cancelled = limiter.shutdown.clone();
        let interval = config.sweep_interval;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                let Some(limiter) = weak.upgrade() else { break };
                let evicted = limiter.sweep();
                if evicted > 0 {
                    tracing::debug!(evicted, remaining = limiter.len(), "rate limiter sweep");
                }
            }
            tracing::debug!("rate limiter sweep stopped");
        });

        limiter
    }

    /// Takes one token for `key`. `false` means reject now.
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let bucket = {
            let mut buckets = lock(&self.buckets);
            buckets
                .entry(key.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(TokenBucket::full(self.config.burst, now))))
                .clone()
        };
        let allowed = lock(&bucket).try_take(now, self.config.per_second, self.config.burst);
        allowed
    }

    /// Evicts idle buckets and returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let idle = self.config.idle_timeout;
        let mut buckets = lock(&self.buckets);
        let before = buckets.len();
        buckets.retain(|_, bucket| now.saturating_duration_since(lock(bucket).last_seen) < idle);
        before - buckets.len()
    }

    pub fn len(&self) -> usize {
        lock(&self.buckets).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Resolves the client address: first `X-Forwarded-For` entry, then
/// `X-Real-Ip`, then the peer address without its port.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// axum middleware, mount with `middleware::from_fn_with_state(limiter, rate_limit)`.
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = client_ip(req.headers(), peer);

    if !limiter.check(&key) {
        counter!("rate_limit_rejected_total").increment(1);
        tracing::warn!(client = %key, path = %req.uri().path(), "rate limit exceeded");
        return Err(AppError::new(ErrorCode::RateLimited, "too many requests"));
    }

    Ok(next.run(req).await)
}
