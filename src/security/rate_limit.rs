//! Inbound rate limiting for flood protection.
//!
//! Each connection owns a governor token bucket refilled at
//! `limits.messages_per_second` with a burst allowance of `limits.burst`. A frame
//! arriving with the bucket empty is answered with a `rate_limited` error and
//! never reaches the router.

use crate::config::LimitsConfig;
use governor::{Quota, RateLimiter as GovRateLimiter};
use std::num::NonZeroU32;

/// Type alias for governor's direct rate limiter.
type DirectRateLimiter = governor::DefaultDirectRateLimiter;

/// Token bucket for one connection's inbound frames.
#[derive(Debug)]
pub struct ConnectionRateLimiter {
    limiter: DirectRateLimiter,
}

impl ConnectionRateLimiter {
    pub fn new(messages_per_second: u32, burst: u32) -> Self {
        let rate = NonZeroU32::new(messages_per_second).unwrap_or(NonZeroU32::MIN);
        // A burst below the sustained rate would throttle below the configured rate.
        let burst = NonZeroU32::new(burst.max(messages_per_second)).unwrap_or(rate);
        Self {
            limiter: GovRateLimiter::direct(Quota::per_second(rate).allow_burst(burst)),
        }
    }

    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self::new(limits.messages_per_second, limits.burst)
    }

    /// Returns `true` if the frame may proceed.
    pub fn check(&self) -> bool {
        self.limiter.check().is_ok()
    }
}
