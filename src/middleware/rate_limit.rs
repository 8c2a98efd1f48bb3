//! In-memory, per-process rate limiting.
//!
//! Each limiter grants `points` requests per client key within a fixed window
//! that opens on the key's first request. State lives in a `DashMap` and is
//! not shared across instances.
//!
//! Five limiters exist, one per route group:
//!
//! | Limiter         | Budget        | Key                  |
//! |-----------------|---------------|----------------------|
//! | `public`        | 100 / 60 s    | client IP            |
//! | `authenticated` | 300 / 60 s    | IP + token hash      |
//! | `order`         | 10 / 60 s     | IP + token hash      |
//! | `admin`         | 500 / 60 s    | IP + token hash      |
//! | `tmdb`          | 60 / 60 s     | client IP            |

use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::{error::AppError, middleware::auth::extract_bearer};

/// Characters of the bearer token that feed the key hash.
const TOKEN_PREFIX_CHARS: usize = 32;
/// Hex characters of the hash kept in the key.
const TOKEN_HASH_CHARS: usize = 16;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    consumed: u32,
}

/// Fixed-window counter keyed by client.
#[derive(Debug)]
pub struct RateLimiter {
    name: &'static str,
    points: u32,
    window: Duration,
    per_token: bool,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(name: &'static str, points: u32, window: Duration, per_token: bool) -> Self {
        Self {
            name,
            points,
            window,
            per_token,
            windows: DashMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn points(&self) -> u32 {
        self.points
    }

    /// Spend one point for `key`.
    ///
    /// Returns the points left in the window, or how long until the window
    /// resets when the budget is exhausted.
    pub fn consume(&self, key: &str, now: Instant) -> Result<u32, Duration> {
        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            started: now,
            consumed: 0,
        });

        let elapsed = now.saturating_duration_since(entry.started);
        if elapsed >= self.window {
            entry.started = now;
            entry.consumed = 0;
        }

        if entry.consumed >= self.points {
            let elapsed = now.saturating_duration_since(entry.started);
            return Err(self.window.saturating_sub(elapsed));
        }

        entry.consumed += 1;
        Ok(self.points - entry.consumed)
    }

    /// Drop every window that has fully elapsed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.saturating_duration_since(w.started) < self.window);
        before - self.windows.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    /// Key for this request: the client IP, plus a token hash for
    /// token-scoped limiters when a bearer token is present.
    pub fn client_key(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        let ip = client_ip(headers, peer);
        if !self.per_token {
            return ip;
        }
        match extract_bearer(headers) {
            Some(token) => format!("{ip}:{}", token_fingerprint(token)),
            None => ip,
        }
    }
}

/// The five route-group limiters.
#[derive(Debug, Clone)]
pub struct RateLimiters {
    pub public: Arc<RateLimiter>,
    pub authenticated: Arc<RateLimiter>,
    pub order: Arc<RateLimiter>,
    pub admin: Arc<RateLimiter>,
    pub tmdb: Arc<RateLimiter>,
}

impl Default for RateLimiters {
    fn default() -> Self {
        let minute = Duration::from_secs(60);
        Self {
            public: Arc::new(RateLimiter::new("public", 100, minute, false)),
            authenticated: Arc::new(RateLimiter::new("authenticated", 300, minute, true)),
            order: Arc::new(RateLimiter::new("order", 10, minute, true)),
            admin: Arc::new(RateLimiter::new("admin", 500, minute, true)),
            tmdb: Arc::new(RateLimiter::new("tmdb", 60, minute, false)),
        }
    }
}

impl RateLimiters {
    fn all(&self) -> [&Arc<RateLimiter>; 5] {
        [
            &self.public,
            &self.authenticated,
            &self.order,
            &self.admin,
            &self.tmdb,
        ]
    }

    pub fn purge_expired(&self, now: Instant) -> usize {
        self.all().iter().map(|l| l.purge_expired(now)).sum()
    }

    pub fn tracked_keys(&self) -> usize {
        self.all().iter().map(|l| l.tracked_keys()).sum()
    }

    /// Periodically purge elapsed windows so idle clients do not accumulate.
    pub fn spawn_janitor(&self, every: Duration) -> tokio::task::JoinHandle<()> {
        let limiters = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let purged = limiters.purge_expired(Instant::now());
                if purged > 0 {
                    tracing::debug!(purged, "rate limit windows purged");
                }
            }
        })
    }
}

/// Client IP: first `X-Forwarded-For` hop, `X-Real-IP`, the peer address,
/// then `unknown`.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .map(str::to_string)
        .or_else(|| peer.map(|p| p.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn token_fingerprint(token: &str) -> String {
    let prefix: String = token.chars().take(TOKEN_PREFIX_CHARS).collect();
    let mut hasher = Sha256::new();
    hasher.update(prefix.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(TOKEN_HASH_CHARS);
    digest
}

fn ceil_secs(d: Duration) -> u64 {
    (d.as_secs() + u64::from(d.subsec_nanos() > 0)).max(1)
}

/// Rate limit middleware; the limiter is the layer's state.
///
/// Rejected requests get 429 with `Retry-After`. Admitted responses carry
/// `X-RateLimit-Limit` and `X-RateLimit-Remaining`.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0);
    let key = limiter.client_key(request.headers(), peer);

    let remaining = match limiter.consume(&key, Instant::now()) {
        Ok(remaining) => remaining,
        Err(wait) => {
            tracing::warn!(limiter = limiter.name(), key = %key, "rate limit exceeded");
            return Err(AppError::RateLimited {
                retry_after_secs: ceil_secs(wait),
            });
        }
    };

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(limiter.points()));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
    Ok(response)
}
