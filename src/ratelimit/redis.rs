use async_trait::async_trait;
use lazy_static::lazy_static;
use log::info;
use redis::aio::MultiplexedConnection;
use redis::{ Client, Script };
use std::error::Error;
use std::time::Duration;
use uuid::Uuid;

use super::{ RateLimitConfig, RateLimitError, RateLimiter };

const KEY_PREFIX: &str = "ratelimit:";

lazy_static! {
    // KEYS[1] sorted set of admission times (ms). ARGV: now_ms, window_ms, max, member.
    // Returns {1, 0} when admitted, {0, retry_after_ms} when rejected.
    static ref SLIDING_WINDOW: Script = Script::new(
        r"
        local now = tonumber(ARGV[1])
        local window = tonumber(ARGV[2])
        redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', now - window)
        if redis.call('ZCARD', KEYS[1]) >= tonumber(ARGV[3]) then
            local oldest = redis.call('ZRANGE', KEYS[1], 0, 0, 'WITHSCORES')
            return {0, tonumber(oldest[2]) + window - now}
        end
        redis.call('ZADD', KEYS[1], now, ARGV[4])
        redis.call('PEXPIRE', KEYS[1], window)
        return {1, 0}
        "
    );
}

/// Sliding-window limiter backed by Redis so several server processes can
/// share one budget per client. Same semantics as `MemoryRateLimiter`: the
/// purge, count and record run as one script, and rejected requests are
/// not recorded.
pub struct RedisRateLimiter {
    conn: MultiplexedConnection,
    config: RateLimitConfig,
}

impl RedisRateLimiter {
    pub async fn connect(
        url: &str,
        config: RateLimitConfig
    ) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let client = Client::open(url).map_err(|e|
            format!("Failed to create Redis client for '{}': {}", url, e)
        )?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!("Rate limiter connected to Redis at {}", url);
        Ok(Self { conn, config })
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn admit(&self, client_key: &str) -> Result<(), RateLimitError> {
        let key = format!("{}{}", KEY_PREFIX, client_key);
        let window_ms = (self.config.window.as_millis() as i64).max(1);
        let now_ms = chrono::Utc::now().timestamp_millis();
        let mut conn = self.conn.clone();

        let (admitted, retry_after_ms): (i64, i64) = SLIDING_WINDOW.key(&key)
            .arg(now_ms)
            .arg(window_ms)
            .arg(self.config.max_requests)
            .arg(Uuid::new_v4().to_string())
            .invoke_async(&mut conn).await
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;

        if admitted == 0 {
            return Err(RateLimitError::Exceeded {
                retry_after: Duration::from_millis(retry_after_ms.max(0) as u64),
            });
        }
        Ok(())
    }
}
