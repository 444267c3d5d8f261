// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-provider request rate limiting over fixed one-minute windows.

use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct MinuteUsage {
    minute: u64,
    requests: u32,
}

/// Fixed-window request counter keyed by provider name.
///
/// Windows align to wall-clock minutes. A provider without a configured limit
/// is never throttled.
#[derive(Debug, Default)]
pub struct RateLimiter {
    usage: DashMap<String, MinuteUsage>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request against `provider` in the current minute.
    ///
    /// Returns `false` if the request would exceed `limit_per_minute`; the
    /// rejected request is not counted.
    pub fn try_acquire(&self, provider: &str, limit_per_minute: Option<u32>) -> bool {
        self.try_acquire_at(provider, limit_per_minute, current_minute())
    }

    fn try_acquire_at(&self, provider: &str, limit_per_minute: Option<u32>, minute: u64) -> bool {
        let Some(limit) = limit_per_minute else {
            return true;
        };

        let mut usage = self
            .usage
            .entry(provider.to_string())
            .or_insert(MinuteUsage {
                minute,
                requests: 0,
            });
        if usage.minute != minute {
            *usage = MinuteUsage {
                minute,
                requests: 0,
            };
        }

        if usage.requests >= limit {
            debug!(provider, limit, "provider rate limit reached");
            return false;
        }
        usage.requests += 1;
        true
    }
}

fn current_minute() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() / 60)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_provider_always_passes() {
        let limiter = RateLimiter::new();
        for _ in 0..1000 {
            assert!(limiter.try_acquire("mock", None));
        }
    }

    #[test]
    fn limit_applies_within_a_minute() {
        let limiter = RateLimiter::new();
        assert!(limiter.try_acquire_at("openai", Some(2), 100));
        assert!(limiter.try_acquire_at("openai", Some(2), 100));
        assert!(!limiter.try_acquire_at("openai", Some(2), 100));
        assert!(!limiter.try_acquire_at("openai", Some(2), 100));
    }

    #[test]
    fn window_resets_on_next_minute() {
        let limiter = RateLimiter::new();
        assert!(limiter.try_acquire_at("openai", Some(1), 100));
        assert!(!limiter.try_acquire_at("openai", Some(1), 100));
        assert!(limiter.try_acquire_at("openai", Some(1), 101));
    }

    #[test]
    fn providers_are_counted_separately() {
        let limiter = RateLimiter::new();
        assert!(limiter.try_acquire_at("openai", Some(1), 7));
        assert!(limiter.try_acquire_at("anthropic", Some(1), 7));
        assert!(!limiter.try_acquire_at("openai", Some(1), 7));
    }

    #[test]
    fn zero_limit_rejects_everything() {
        let limiter = RateLimiter::new();
        assert!(!limiter.try_acquire("openai", Some(0)));
    }
}
