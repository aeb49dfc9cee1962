pub mod memory;
pub mod redis;

use async_trait::async_trait;
use log::info;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::cli::Args;

pub use self::memory::MemoryRateLimiter;
pub use self::redis::RedisRateLimiter;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Too many requests. Please try again later.")]
    Exceeded {
        retry_after: Duration,
    },
    #[error("Rate limiter backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            max_requests: 10,
        }
    }
}

/// Per-client admission control. `admit` must check and count a request as
/// a single atomic step for a given key.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn admit(&self, client_key: &str) -> Result<(), RateLimitError>;
}

pub async fn create_rate_limiter(
    args: &Args
) -> Result<Arc<dyn RateLimiter>, Box<dyn Error + Send + Sync>> {
    let config = RateLimitConfig {
        window: Duration::from_secs(args.rate_limit_window_secs),
        max_requests: args.rate_limit_max_requests,
    };
    info!(
        "Rate limiter: type={}, window={}s, max_requests={}",
        args.rate_limit_type,
        args.rate_limit_window_secs,
        args.rate_limit_max_requests
    );
    match args.rate_limit_type.to_lowercase().as_str() {
        "memory" => Ok(Arc::new(MemoryRateLimiter::new(config))),
        "redis" => {
            let limiter = RedisRateLimiter::connect(&args.rate_limit_redis_url, config).await?;
            Ok(Arc::new(limiter))
        }
        other => Err(format!("Unsupported rate limiter type: {}", other).into()),
    }
}
