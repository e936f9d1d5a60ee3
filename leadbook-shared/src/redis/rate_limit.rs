/// Token bucket rate limiting backed by Redis
///
/// Each bucket lives in a Redis hash (`tokens`, `last_refill`) and is updated
/// by one Lua script so concurrent API processes see a consistent count.
///
/// # Scopes
///
/// | Scope           | Keyed by  | Capacity / refill            |
/// |-----------------|-----------|------------------------------|
/// | Auth endpoints  | client IP | 10 burst, 10 per minute      |
/// | Lead intake     | client IP | 30 burst, 30 per minute      |
/// | Email sends     | owner     | by license plan (see below)  |
///
/// Email plan limits per minute: trial 5, basic 30, pro 120.
///
/// # Storage
///
/// Keys: `leadbook:ratelimit:{scope}:{subject}`, expiring after two idle
/// minutes.

use std::time::{SystemTime, UNIX_EPOCH};

use super::client::{RedisClient, RedisClientError};
use crate::models::license::LicensePlan;

const TOKEN_BUCKET_SCRIPT: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local refill_rate = tonumber(ARGV[2])
local now = tonumber(ARGV[3])

local bucket = redis.call('HMGET', key, 'tokens', 'last_refill')
local tokens = tonumber(bucket[1])
local last_refill = tonumber(bucket[2])

if not tokens then
    tokens = capacity
    last_refill = now
end

local elapsed = math.max(0, now - last_refill)
tokens = math.min(capacity, tokens + (elapsed * refill_rate))

if tokens >= 1 then
    tokens = tokens - 1
    redis.call('HSET', key, 'tokens', tokens, 'last_refill', now)
    redis.call('EXPIRE', key, 120)
    return {1, math.floor(tokens), 0}
else
    redis.call('HSET', key, 'tokens', tokens, 'last_refill', now)
    redis.call('EXPIRE', key, 120)
    return {0, 0, math.ceil((1 - tokens) / refill_rate)}
end
"#;

/// Bucket parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    /// Burst size
    pub bucket_capacity: u32,

    /// Tokens added per second
    pub refill_rate: f64,
}

impl RateLimit {
    /// `n` requests per minute with a burst of `n`
    pub fn per_minute(n: u32) -> Self {
        Self {
            bucket_capacity: n,
            refill_rate: f64::from(n) / 60.0,
        }
    }

    /// Login, signup, refresh and password reset, per client IP
    pub fn auth() -> Self {
        Self::per_minute(10)
    }

    /// Public lead intake, per client IP
    pub fn lead_intake() -> Self {
        Self::per_minute(30)
    }

    /// Email send endpoints, per owner
    pub fn email_for_plan(plan: Option<LicensePlan>) -> Self {
        match plan {
            Some(LicensePlan::Pro) => Self::per_minute(120),
            Some(LicensePlan::Basic) => Self::per_minute(30),
            Some(LicensePlan::Trial) | None => Self::per_minute(5),
        }
    }
}

/// Outcome of consuming one token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,

    /// Whole tokens left after this request
    pub remaining: u32,

    /// Seconds until a token is available (0 when allowed)
    pub retry_after: u64,
}

impl RateLimitDecision {
    fn from_reply(reply: &[i64]) -> Result<Self, RedisClientError> {
        match reply {
            [allowed, remaining, retry_after] => Ok(Self {
                allowed: *allowed == 1,
                remaining: u32::try_from(*remaining).unwrap_or(0),
                retry_after: u64::try_from(*retry_after).unwrap_or(0),
            }),
            other => Err(RedisClientError::CommandError(format!(
                "unexpected rate limit reply: {:?}",
                other
            ))),
        }
    }
}

/// Redis key of a bucket
pub fn bucket_key(scope: &str, subject: &str) -> String {
    format!("leadbook:ratelimit:{}:{}", scope, subject)
}

/// Consumes tokens from Redis-held buckets
#[derive(Clone)]
pub struct RateLimiter {
    redis: RedisClient,
    script: redis::Script,
}

impl RateLimiter {
    pub fn new(redis: RedisClient) -> Self {
        Self {
            redis,
            script: redis::Script::new(TOKEN_BUCKET_SCRIPT),
        }
    }

    /// Takes one token from the bucket `scope`/`subject`
    pub async fn check(
        &self,
        scope: &str,
        subject: &str,
        limit: RateLimit,
    ) -> Result<RateLimitDecision, RedisClientError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        let mut conn = self.redis.get_connection();
        let mut invocation = self.script.key(bucket_key(scope, subject));
        invocation
            .arg(limit.bucket_capacity)
            .arg(limit.refill_rate)
            .arg(now);

        let reply: Vec<i64> = self
            .redis
            .with_timeout(invocation.invoke_async(&mut conn))
            .await?;

        RateLimitDecision::from_reply(&reply)
    }
}
