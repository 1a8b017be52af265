//! Login attempt rate limiting.
//!
//! Two token buckets: 2 logins a minute with a 12-an-hour fallback. The
//! minute bucket absorbs normal typos; the hour bucket caps sustained
//! guessing without locking out a user who fumbles a couple of times.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Pure token-bucket value. Refill is continuous and monotonic with the
/// supplied clock, capped at capacity.
#[derive(Debug, Clone, Copy)]
struct TokenBucket {
    capacity: f64,
    refill_interval: Duration,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(capacity: u32, refill_interval: Duration, now: Instant) -> Self {
        Self {
            capacity: f64::from(capacity),
            refill_interval,
            tokens: f64::from(capacity),
            last_refill: now,
        }
    }

    fn try_remove(&mut self, now: Instant) -> bool {
        // saturating_duration_since keeps refill monotonic even if the
        // caller hands in an older instant.
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        let rate = self.capacity / self.refill_interval.as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

struct Buckets {
    minute: TokenBucket,
    hour: TokenBucket,
}

/// Shared limiter for the login endpoint. One instance per running gate;
/// state resets with the process.
pub struct RateLimiter {
    buckets: Mutex<Buckets>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            buckets: Mutex::new(Buckets {
                minute: TokenBucket::new(2, Duration::from_secs(60), now),
                hour: TokenBucket::new(12, Duration::from_secs(3600), now),
            }),
        }
    }

    /// Withdraw one token, minute bucket first, hour bucket as fallback.
    /// Atomic under concurrent callers: the lock covers check and
    /// withdrawal together.
    pub fn try_consume(&self) -> bool {
        self.try_consume_at(Instant::now())
    }

    fn try_consume_at(&self, now: Instant) -> bool {
        let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");
        buckets.minute.try_remove(now) || buckets.hour.try_remove(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_attempts_come_from_the_minute_bucket() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        assert!(limiter.try_consume_at(now));
        assert!(limiter.try_consume_at(now));
    }

    #[test]
    fn hour_bucket_covers_the_next_twelve() {
        let limiter = RateLimiter::new();
        let now = Instant::now();

        for _ in 0..14 {
            assert!(limiter.try_consume_at(now));
        }
        assert!(!limiter.try_consume_at(now));
        assert!(!limiter.try_consume_at(now + Duration::from_secs(10)));
    }

    #[test]
    fn minute_bucket_refills_after_a_minute() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        for _ in 0..14 {
            assert!(limiter.try_consume_at(start));
        }
        assert!(!limiter.try_consume_at(start));

        // 61s later the minute bucket is full again; the hour bucket has
        // only dripped a fraction of a token back.
        let later = start + Duration::from_secs(61);
        assert!(limiter.try_consume_at(later));
        assert!(limiter.try_consume_at(later));
        assert!(!limiter.try_consume_at(later));
    }

    #[test]
    fn refill_never_exceeds_capacity() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        // A day of idling still yields only capacity tokens.
        let much_later = start + Duration::from_secs(86_400);
        for _ in 0..14 {
            assert!(limiter.try_consume_at(much_later));
        }
        assert!(!limiter.try_consume_at(much_later));
    }

    #[test]
    fn clock_going_backwards_is_harmless() {
        let limiter = RateLimiter::new();
        let start = Instant::now();

        assert!(limiter.try_consume_at(start + Duration::from_secs(30)));
        assert!(limiter.try_consume_at(start));
        // Minute bucket empty, falls through to the hour bucket.
        assert!(limiter.try_consume_at(start));
    }

    #[test]
    fn concurrent_consumers_never_oversell() {
        use std::sync::Arc;

        let limiter = Arc::new(RateLimiter::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = Arc::clone(&limiter);
            handles.push(std::thread::spawn(move || {
                let mut granted = 0u32;
                for _ in 0..4 {
                    if limiter.try_consume() {
                        granted += 1;
                    }
                }
                granted
            }));
        }

        let granted: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        // 2 + 12 tokens available; a few may drip back during the test,
        // but nowhere near the 32 requested.
        assert!(granted >= 14);
        assert!(granted <= 16);
    }
}
