//! Fixed-window rate limiting.
//!
//! Each client key owns a bucket that counts requests since the start of its
//! current window. The window restarts on the first request made strictly
//! after it has elapsed, so a client can get up to twice the limit through across a
//! window boundary.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, Request},
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{AdmissionError, ClientAddrResolver};
use crate::pipeline::{Admitted, Rejection, Stage};

pub const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
pub const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Key used when the client address cannot be resolved.
const UNKNOWN_CLIENT: &str = "unknown";

/// Bucket count above which expired buckets are swept, at most once per window.
const SWEEP_THRESHOLD: usize = 10_000;

/// Window and limit for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Window length in milliseconds.
    pub window_ms: u64,
    /// Requests admitted per window.
    pub max: u32,
}

impl RateLimitSettings {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Seconds until `reset_after` elapses, rounded up.
pub fn reset_secs(reset_after: Duration) -> u64 {
    reset_after.as_secs() + u64::from(reset_after.subsec_nanos() > 0)
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    count: u32,
    window_start: Instant,
}

/// Per-key buckets of one limiter.
///
/// Cloning shares the underlying map. Each bucket is updated under its
/// shard's write lock, so concurrent hits on one key are serialized.
#[derive(Debug, Clone, Default)]
pub struct RateLimitStore {
    buckets: Arc<DashMap<String, Bucket>>,
    last_sweep: Arc<Mutex<Option<Instant>>>,
}

impl RateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every bucket.
    pub fn reset(&self) {
        self.buckets.clear();
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Remove buckets whose window ended before `now`.
    pub fn purge_expired(&self, window: Duration, now: Instant) {
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.window_start) <= window);
    }

    /// Purge expired buckets once the store is large, unless a sweep already
    /// ran within the last `window`. Skips when another caller is sweeping.
    fn sweep_if_due(&self, window: Duration, now: Instant) {
        if self.buckets.len() <= SWEEP_THRESHOLD {
            return;
        }
        let Ok(mut last_sweep) = self.last_sweep.try_lock() else {
            return;
        };
        if last_sweep.is_some_and(|last| now.saturating_duration_since(last) < window) {
            return;
        }
        *last_sweep = Some(now);
        drop(last_sweep);

        self.purge_expired(window, now);
    }
}

/// Result of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window ends.
    pub reset_after: Duration,
}

impl RateLimitDecision {
    /// Quota headers sent with admitted responses.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(
            RATE_LIMIT_RESET,
            HeaderValue::from(reset_secs(self.reset_after)),
        );
        headers
    }
}

/// Derives the bucket key of a request.
pub type KeyExtractor = Arc<dyn Fn(&Request<Body>) -> String + Send + Sync>;

/// Fixed-window limiter for one tier.
#[derive(Clone)]
pub struct RateLimiter {
    tier: &'static str,
    settings: RateLimitSettings,
    store: RateLimitStore,
    key: KeyExtractor,
}

impl RateLimiter {
    /// Limiter keyed by the resolved client address.
    pub fn new(
        tier: &'static str,
        settings: RateLimitSettings,
        resolver: ClientAddrResolver,
    ) -> Self {
        Self {
            tier,
            settings,
            store: RateLimitStore::new(),
            key: Arc::new(move |req| {
                resolver
                    .resolve(req)
                    .map(|addr| addr.to_string())
                    .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
            }),
        }
    }

    /// Use an externally owned store.
    pub fn with_store(mut self, store: RateLimitStore) -> Self {
        self.store = store;
        self
    }

    /// Replace the client key function.
    pub fn with_key_extractor<F>(mut self, key: F) -> Self
    where
        F: Fn(&Request<Body>) -> String + Send + Sync + 'static,
    {
        self.key = Arc::new(key);
        self
    }

    pub fn tier(&self) -> &'static str {
        self.tier
    }

    pub fn settings(&self) -> RateLimitSettings {
        self.settings
    }

    pub fn store(&self) -> &RateLimitStore {
        &self.store
    }

    /// Count a request for `key` now.
    pub fn hit(&self, key: &str) -> RateLimitDecision {
        self.hit_at(key, Instant::now())
    }

    /// Count a request for `key` at `now`.
    pub fn hit_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let window = self.settings.window();

        self.store.sweep_if_due(window, now);

        let mut bucket = self
            .store
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| Bucket {
                count: 0,
                window_start: now,
            });

        if now.saturating_duration_since(bucket.window_start) > window {
            bucket.count = 0;
            bucket.window_start = now;
        }
        bucket.count = bucket.count.saturating_add(1);

        let elapsed = now.saturating_duration_since(bucket.window_start);
        RateLimitDecision {
            allowed: bucket.count <= self.settings.max,
            limit: self.settings.max,
            remaining: self.settings.max.saturating_sub(bucket.count),
            reset_after: window.saturating_sub(elapsed),
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("tier", &self.tier)
            .field("settings", &self.settings)
            .field("buckets", &self.store.len())
            .finish_non_exhaustive()
    }
}

impl Stage for RateLimiter {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn inspect(&self, req: &mut Request<Body>) -> Result<Admitted, Rejection> {
        let key = (self.key)(req);
        let decision = self.hit(&key);

        if decision.allowed {
            return Ok(Admitted::with_headers(decision.headers()));
        }

        warn!(
            tier = self.tier,
            client = %key,
            limit = decision.limit,
            "rate limit exceeded"
        );
        Err(AdmissionError::RateLimited {
            tier: self.tier,
            limit: decision.limit,
            reset_after: decision.reset_after,
        }
        .into())
    }
}
