//! Per-client token bucket rate limiting.
//!
//! Each client key owns a bucket of capacity `burst` that refills at
//! `refill_per_sec` tokens per second. An admitted request consumes one token;
//! a request arriving at an empty bucket is rejected and consumes nothing.
//! Refill is computed lazily from the time since the bucket was last touched,
//! so idle clients cost nothing until they return.
//!
//! # Bounds
//!
//! - A single key is admitted at most `burst + refill_per_sec * t` times over
//!   any interval of `t` seconds.
//! - [`RateLimiter::sweep`] drops every bucket that has refilled completely.
//!   A full bucket is indistinguishable from a fresh one, so dropping it never
//!   changes a later decision. After `burst / refill_per_sec` seconds without
//!   traffic every bucket is full and one sweep empties the map.
//!
//! # Thread Safety
//!
//! The map sits behind a single `RwLock`. Admission takes the write lock
//! because it both creates buckets on first sight and mutates the token
//! count; two concurrent first requests for one key therefore share one
//! bucket.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use tokio::task::JoinHandle;

use crate::error::GatewayError;

/// Header whose first comma-separated element names the client.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
/// Fallback client header.
pub const X_REAL_IP: &str = "x-real-ip";

/// Bucket parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    /// Refill rate R.
    pub refill_per_sec: f64,
    /// Capacity B.
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            refill_per_sec: 10.0,
            burst: 20,
        }
    }
}

/// A lazily refilled token bucket.
#[derive(Debug, Clone, Copy)]
pub struct TokenBucket {
    tokens: f64,
    last: Instant,
}

impl TokenBucket {
    /// A bucket holding `burst` tokens.
    #[must_use]
    pub fn full(config: &RateLimitConfig, now: Instant) -> Self {
        Self {
            tokens: f64::from(config.burst),
            last: now,
        }
    }

    fn refill(&mut self, config: &RateLimitConfig, now: Instant) {
        // Instants observed out of order add nothing.
        if now > self.last {
            let elapsed = now.duration_since(self.last).as_secs_f64();
            self.tokens = (self.tokens + elapsed * config.refill_per_sec)
                .min(f64::from(config.burst));
            self.last = now;
        }
    }

    /// Takes one token if available.
    pub fn try_take(&mut self, config: &RateLimitConfig, now: Instant) -> bool {
        self.refill(config, now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Returns true if the bucket has refilled to capacity by `now`.
    pub fn is_full(&mut self, config: &RateLimitConfig, now: Instant) -> bool {
        self.refill(config, now);
        self.tokens >= f64::from(config.burst)
    }

    #[must_use]
    pub const fn tokens(&self) -> f64 {
        self.tokens
    }
}

/// Token buckets keyed by client.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: RwLock<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Charges one token to `key`.
    pub fn check(&self, key: &str) -> Result<(), GatewayError> {
        self.check_at(key, now())
    }

    /// Charges one token to `key` as of `now`.
    pub fn check_at(&self, key: &str, now: Instant) -> Result<(), GatewayError> {
        let mut buckets = self
            .buckets
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let admitted = if let Some(bucket) = buckets.get_mut(key) {
            bucket.try_take(&self.config, now)
        } else {
            let mut bucket = TokenBucket::full(&self.config, now);
            let admitted = bucket.try_take(&self.config, now);
            buckets.insert(key.to_string(), bucket);
            admitted
        };

        if admitted {
            Ok(())
        } else {
            tracing::debug!(client = %key, "rate limit exceeded");
            Err(GatewayError::RateLimitExceeded(key.to_string()))
        }
    }

    /// Removes every bucket that has refilled to capacity. Returns the
    /// number removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut buckets = self
            .buckets
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = buckets.len();
        buckets.retain(|_, bucket| !bucket.is_full(&self.config, now));
        before - buckets.len()
    }

    /// Number of clients currently holding a bucket.
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Current time from the tokio clock, so paused test time applies.
fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Runs [`RateLimiter::sweep`] every `interval` until the task is aborted.
pub fn spawn_sweeper(limiter: Arc<RateLimiter>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = limiter.sweep();
            tracing::debug!(
                removed,
                remaining = limiter.tracked_clients(),
                "swept idle rate limit buckets"
            );
        }
    })
}

/// Resolves the rate limit key for a request: the first `X-Forwarded-For`
/// element, else `X-Real-IP`, else the transport peer address.
#[must_use]
pub fn client_key(headers: &HeaderMap, remote: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    if let Some(first) = header(X_FORWARDED_FOR)
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        return first.to_string();
    }
    if let Some(real_ip) = header(X_REAL_IP) {
        return real_ip.to_string();
    }
    remote.map_or_else(|| "unknown".to_string(), |addr| addr.ip().to_string())
}
