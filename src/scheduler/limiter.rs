//! Per-endpoint token-bucket rate limiting.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::{Config, MIN_SCHEDULE};

/// Non-blocking token bucket: rate `1 / interval`, burst 1.
///
/// The bucket starts full, so the first `allow` after construction
/// succeeds; thereafter tokens refill continuously at the configured rate.
#[derive(Debug)]
pub struct TokenBucket {
    interval: Duration,
    tokens: f64,
    last_refill: Instant,
}

/// Bucket capacity. One token: a single probe per interval, no bursts.
const BURST: f64 = 1.0;

impl TokenBucket {
    /// Create a bucket refilling one token per `interval`, clamped to the
    /// one minute schedule floor.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(MIN_SCHEDULE),
            tokens: BURST,
            last_refill: Instant::now(),
        }
    }

    /// Consume a token if one is available. Never blocks.
    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }

    /// `allow` with an explicit clock, for deterministic tests.
    pub fn allow_at(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed.is_zero() {
            return;
        }
        let refilled = elapsed.as_secs_f64() / self.interval.as_secs_f64();
        self.tokens = (self.tokens + refilled).min(BURST);
        self.last_refill = now;
    }
}

/// Rate limiters keyed by `"<payer>:<endpoint type>"`.
///
/// Rebuilt atomically from each adopted config snapshot; owned by the
/// scheduler under its mutex.
#[derive(Debug, Default)]
pub struct LimiterRegistry {
    limiters: HashMap<String, TokenBucket>,
}

impl LimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the full registry for a config snapshot.
    pub fn from_config(config: &Config) -> Self {
        let mut limiters = HashMap::new();
        for payer in &config.payers {
            for endpoint in &payer.endpoints {
                let key = format!("{}:{}", payer.name, endpoint.endpoint_type);
                limiters.insert(key, TokenBucket::new(endpoint.effective_schedule()));
            }
        }
        Self { limiters }
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut TokenBucket> {
        self.limiters.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}
