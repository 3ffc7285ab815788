//! Shared rate limiting for outbound lookups
//!
//! One limiter instance is injected into the geocoding client and shared by
//! every record of a run, so the minimum interval holds across records,
//! not just between the fallback queries of one address.

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota};
use std::time::Duration;
use tracing::debug;

/// Time gate in front of the external lookup
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Wait until the next outbound call is allowed
    async fn acquire(&self);
}

/// Enforces a minimum interval between consecutive calls
///
/// Backed by a `governor` direct limiter with one cell per interval and a
/// burst of one: the first call passes immediately, each later call waits
/// until the interval has elapsed since the previous one.
pub struct IntervalLimiter {
    limiter: Option<DefaultDirectRateLimiter>,
    min_interval: Duration,
}

impl IntervalLimiter {
    /// Limiter with the given minimum interval; zero disables waiting
    pub fn new(min_interval: Duration) -> Self {
        let limiter = Quota::with_period(min_interval).map(DefaultDirectRateLimiter::direct);
        Self {
            limiter,
            min_interval,
        }
    }

    pub fn from_millis(min_interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(min_interval_ms))
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
}

#[async_trait]
impl RateLimiter for IntervalLimiter {
    async fn acquire(&self) {
        if let Some(limiter) = &self.limiter {
            if limiter.check().is_err() {
                debug!(
                    interval_ms = self.min_interval.as_millis() as u64,
                    "Rate limiting: waiting before lookup"
                );
                limiter.until_ready().await;
            }
        }
    }
}

/// Limiter that never waits (tests, offline fixtures)
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDelay;

#[async_trait]
impl RateLimiter for NoDelay {
    async fn acquire(&self) {}
}
