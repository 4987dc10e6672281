//! Redis-backed per-client rate limiting for the HTTP front door: a
//! fixed window per second and per minute, counted in Redis so limits
//! hold across multiple API process instances.

use redis::AsyncCommands;

/// Rate limit configuration.
#[derive(Clone)]
pub struct RateLimitConfig {
    pub per_second: u32,
    pub per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: 5,
            per_minute: 100,
        }
    }
}

#[derive(Debug)]
pub enum RateLimitResult {
    Allowed { remaining_second: u32, remaining_minute: u32 },
    Exceeded { retry_after_seconds: u32 },
}

/// Check and increment a client's rate-limit counters.
///
/// # Errors
/// Returns `redis::RedisError` on a connection or command failure.
pub async fn check_rate_limit(
    redis: &mut redis::aio::MultiplexedConnection,
    client_id: &str,
    config: &RateLimitConfig,
) -> Result<RateLimitResult, redis::RedisError> {
    let second_key = format!("cortexd:ratelimit:{client_id}:second");
    let minute_key = format!("cortexd:ratelimit:{client_id}:minute");

    let second_count: u32 = redis.incr(&second_key, 1).await?;
    if second_count == 1 {
        let _: () = redis.expire(&second_key, 1).await?;
    }
    if second_count > config.per_second {
        return Ok(RateLimitResult::Exceeded { retry_after_seconds: 1 });
    }

    let minute_count: u32 = redis.incr(&minute_key, 1).await?;
    if minute_count == 1 {
        let _: () = redis.expire(&minute_key, 60).await?;
    }
    if minute_count > config.per_minute {
        let ttl: i64 = redis.ttl(&minute_key).await?;
        return Ok(RateLimitResult::Exceeded {
            retry_after_seconds: ttl.max(1) as u32,
        });
    }

    Ok(RateLimitResult::Allowed {
        remaining_second: config.per_second.saturating_sub(second_count),
        remaining_minute: config.per_minute.saturating_sub(minute_count),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_limits() {
        let config = RateLimitConfig::default();
        assert_eq!(config.per_second, 5);
        assert_eq!(config.per_minute, 100);
    }
}
