//! Token bucket limiter for hot-path log messages
//!
//! Route notifications can arrive in bursts of thousands (a BGP session
//! flap, a full resync), so per-message diagnostics go through a limiter
//! that allows `burst` messages and then `per_minute` messages per minute.
//! Suppressed messages are counted and reported with the next one allowed.
//!
//! NIST 800-53 Rev5 [AU-4]: Audit Log Storage Capacity - Bounded log volume

use std::time::{Duration, Instant};

/// Limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    /// Maximum tokens (burst capacity)
    pub burst: u32,
    /// Tokens added per minute
    pub per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            burst: 20,
            per_minute: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    tokens: f64,
    last_refill: Instant,
    suppressed: u64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::starting_at(config, Instant::now())
    }

    fn starting_at(config: RateLimitConfig, now: Instant) -> Self {
        Self {
            config,
            tokens: f64::from(config.burst),
            last_refill: now,
            suppressed: 0,
        }
    }

    /// Try to take a token.
    ///
    /// Returns `Some(n)` when the message may be logged, where `n` is the
    /// number of messages suppressed since the last allowed one, or `None`
    /// when the message must be dropped.
    pub fn check(&mut self) -> Option<u64> {
        self.check_at(Instant::now())
    }

    pub fn check_at(&mut self, now: Instant) -> Option<u64> {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Some(std::mem::take(&mut self.suppressed))
        } else {
            self.suppressed += 1;
            None
        }
    }

    /// Messages dropped since the last allowed one
    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed.is_zero() {
            return;
        }
        let added = elapsed.as_secs_f64() * f64::from(self.config.per_minute)
            / Duration::from_secs(60).as_secs_f64();
        self.tokens = (self.tokens + added).min(f64::from(self.config.burst));
        self.last_refill = now;
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_suppress() {
        let now = Instant::now();
        let mut rl = RateLimiter::starting_at(
            RateLimitConfig {
                burst: 3,
                per_minute: 5,
            },
            now,
        );

        assert_eq!(rl.check_at(now), Some(0));
        assert_eq!(rl.check_at(now), Some(0));
        assert_eq!(rl.check_at(now), Some(0));
        assert_eq!(rl.check_at(now), None);
        assert_eq!(rl.check_at(now), None);
        assert_eq!(rl.suppressed(), 2);
    }

    #[test]
    fn test_refill_reports_suppressed() {
        let now = Instant::now();
        let mut rl = RateLimiter::starting_at(
            RateLimitConfig {
                burst: 1,
                per_minute: 5,
            },
            now,
        );

        assert_eq!(rl.check_at(now), Some(0));
        assert_eq!(rl.check_at(now), None);
        assert_eq!(rl.check_at(now + Duration::from_secs(1)), None);

        // 5 per minute: one token every 12 seconds
        let later = now + Duration::from_secs(13);
        assert_eq!(rl.check_at(later), Some(2));
        assert_eq!(rl.suppressed(), 0);
    }

    #[test]
    fn test_refill_capped_at_burst() {
        let now = Instant::now();
        let mut rl = RateLimiter::starting_at(
            RateLimitConfig {
                burst: 2,
                per_minute: 60,
            },
            now,
        );

        let later = now + Duration::from_secs(3600);
        assert_eq!(rl.check_at(later), Some(0));
        assert_eq!(rl.check_at(later), Some(0));
        assert_eq!(rl.check_at(later), None);
    }
}
