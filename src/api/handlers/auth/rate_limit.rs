//! Sliding-window rate limiting for login attempts.
//!
//! Purely in-memory and per-process: the window resets on restart, which is
//! acceptable for a throttle (the lockout tracker is the persisted boundary).

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

/// Counts attempts per key within a sliding window.
///
/// Keys are `ip:username` so one source cannot starve other accounts and one
/// account cannot be griefed from a single address beyond the window cap.
pub struct SlidingWindowLimiter {
    window_seconds: i64,
    max_attempts: usize,
    buckets: Mutex<HashMap<String, Vec<i64>>>,
}

impl SlidingWindowLimiter {
    #[must_use]
    pub fn new(window_seconds: i64, max_attempts: usize) -> Self {
        Self {
            window_seconds,
            max_attempts,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Record-and-check in one step: allowed attempts are counted, limited
    /// ones are not.
    pub fn check(&self, key: &str, now: i64) -> RateLimitDecision {
        let mut buckets = match self.buckets.lock() {
            Ok(guard) => guard,
            // A poisoned lock only means another request panicked mid-insert;
            // the timestamp list is still usable.
            Err(poisoned) => poisoned.into_inner(),
        };

        let bucket = buckets.entry(key.to_string()).or_default();
        bucket.retain(|t| now - t <= self.window_seconds);

        if bucket.len() >= self.max_attempts {
            return RateLimitDecision::Limited;
        }
        bucket.push(now);
        RateLimitDecision::Allowed
    }
}

pub(crate) fn login_key(ip: &str, username: &str) -> String {
    format!("{ip}:{username}")
}

#[cfg(test)]
mod tests {
    use super::{login_key, RateLimitDecision, SlidingWindowLimiter};

    #[test]
    fn allows_up_to_max_within_window() {
        let limiter = SlidingWindowLimiter::new(300, 20);
        let key = login_key("10.0.0.1", "admin");
        for _ in 0..20 {
            assert_eq!(limiter.check(&key, 1_000), RateLimitDecision::Allowed);
        }
        assert_eq!(limiter.check(&key, 1_000), RateLimitDecision::Limited);
    }

    #[test]
    fn window_slides() {
        let limiter = SlidingWindowLimiter::new(300, 20);
        let key = login_key("10.0.0.1", "admin");
        for _ in 0..20 {
            limiter.check(&key, 1_000);
        }
        assert_eq!(limiter.check(&key, 1_000), RateLimitDecision::Limited);
        // Just past the window, the earliest timestamps fall out.
        assert_eq!(limiter.check(&key, 1_301), RateLimitDecision::Allowed);
    }

    #[test]
    fn limited_attempts_do_not_extend_the_window() {
        let limiter = SlidingWindowLimiter::new(300, 1);
        let key = login_key("10.0.0.1", "admin");
        assert_eq!(limiter.check(&key, 1_000), RateLimitDecision::Allowed);
        // Hammering while limited must not push the reset point forward.
        for t in 1_001..1_050 {
            assert_eq!(limiter.check(&key, t), RateLimitDecision::Limited);
        }
        assert_eq!(limiter.check(&key, 1_301), RateLimitDecision::Allowed);
    }

    #[test]
    fn keys_are_independent() {
        let limiter = SlidingWindowLimiter::new(300, 1);
        assert_eq!(
            limiter.check(&login_key("10.0.0.1", "admin"), 1_000),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check(&login_key("10.0.0.2", "admin"), 1_000),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check(&login_key("10.0.0.1", "guest"), 1_000),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check(&login_key("10.0.0.1", "admin"), 1_000),
            RateLimitDecision::Limited
        );
    }
}
