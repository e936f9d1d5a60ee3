/// Redis integration
///
/// - [`client`]: connection management and health checks
/// - [`rate_limit`]: token bucket rate limiting shared by all API processes

pub mod client;
pub mod rate_limit;

pub use client::{RedisClient, RedisClientError, RedisConfig};
pub use rate_limit::{RateLimit, RateLimitDecision, RateLimiter};
