//! Security and abuse-prevention modules.
//!
//! - [`rate_limit`]: per-connection inbound message rate limiting

pub mod rate_limit;

pub use rate_limit::ConnectionRateLimiter;
