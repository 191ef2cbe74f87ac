// rate.rs — Token-bucket rate limiting per (tool, provider).
//
// Each (tool, provider) pair gets its own bucket so a chatty evidence
// fetch against one cloud cannot starve ticket writes against another.
// Buckets refill continuously rather than per fixed window, which avoids
// the burst-at-window-boundary artifact.
//
// The limiter uses interior mutability (a Mutex around the bucket map)
// so a single engine can be shared by concurrent runs. Time is always
// passed in explicitly through `check_at`; `check` is the wall-clock
// convenience wrapper.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bucket sizing shared by every (tool, provider) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitConfig {
    /// Burst capacity of each bucket.
    pub capacity: u32,

    /// Tokens restored per second. A refill of 0 permanently disables a
    /// bucket once drained.
    pub refill_per_sec: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 60,
            refill_per_sec: 1.0,
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateDecision {
    /// A token was available and has been consumed.
    Ok,
    /// The bucket is empty; retry after the given number of seconds.
    Limited { retry_after_secs: u64 },
}

struct TokenBucket {
    tokens: f64,
    last_refill: DateTime<Utc>,
}

impl TokenBucket {
    fn full(config: &RateLimitConfig, now: DateTime<Utc>) -> Self {
        Self {
            tokens: config.capacity as f64,
            last_refill: now,
        }
    }

    fn try_acquire(&mut self, config: &RateLimitConfig, now: DateTime<Utc>) -> RateDecision {
        let elapsed_secs = (now - self.last_refill).num_milliseconds().max(0) as f64 / 1000.0;
        self.tokens =
            (self.tokens + elapsed_secs * config.refill_per_sec).min(config.capacity as f64);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            RateDecision::Ok
        } else {
            // Float-to-int casts saturate, so a zero refill rate yields
            // u64::MAX rather than a panic.
            let deficit = 1.0 - self.tokens;
            let retry = (deficit / config.refill_per_sec).ceil() as u64;
            RateDecision::Limited {
                retry_after_secs: retry.max(1),
            }
        }
    }
}

/// Shared rate limiter keyed by (tool, provider).
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<(String, String), TokenBucket>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Check and consume a token using the wall clock.
    pub fn check(&self, tool: &str, provider: &str) -> RateDecision {
        self.check_at(tool, provider, Utc::now())
    }

    /// Check and consume a token at an explicit instant. Tests drive this
    /// directly so refill behavior is deterministic.
    pub fn check_at(&self, tool: &str, provider: &str, now: DateTime<Utc>) -> RateDecision {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        let bucket = buckets
            .entry((tool.to_string(), provider.to_string()))
            .or_insert_with(|| TokenBucket::full(&self.config, now));
        bucket.try_acquire(&self.config, now)
    }
}
