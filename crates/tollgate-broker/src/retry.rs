// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exponential backoff between provider attempts.

use std::time::Duration;

/// Upper bound on any single backoff delay.
const MAX_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    /// Fraction of the delay randomly added or removed (0.0-1.0).
    jitter: f64,
}

impl Backoff {
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            max: MAX_DELAY,
            jitter: 0.2,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`,
    /// capped, then jittered.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(20) as i32;
        let nominal = (self.base.as_millis() as f64 * 2f64.powi(exp)).min(self.max.as_millis() as f64);

        let jittered = if self.jitter > 0.0 {
            let range = nominal * self.jitter;
            (nominal + rand::random::<f64>() * range * 2.0 - range).max(0.0)
        } else {
            nominal
        };
        Duration::from_millis(jittered as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_per_retry() {
        let backoff = Backoff::new(Duration::from_millis(250)).with_jitter(0.0);
        assert_eq!(backoff.delay_for(1), Duration::from_millis(250));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(500));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(1000));
    }

    #[test]
    fn capped_at_max() {
        let backoff = Backoff::new(Duration::from_secs(3)).with_jitter(0.0);
        assert_eq!(backoff.delay_for(30), MAX_DELAY);
    }

    #[test]
    fn jitter_stays_in_range() {
        let backoff = Backoff::new(Duration::from_millis(100)).with_jitter(0.5);
        for _ in 0..200 {
            let d = backoff.delay_for(1).as_millis();
            assert!((50..=150).contains(&d), "delay {d}ms out of range");
        }
    }

    #[test]
    fn zero_base_never_sleeps() {
        let backoff = Backoff::new(Duration::ZERO);
        assert_eq!(backoff.delay_for(3), Duration::ZERO);
    }
}
