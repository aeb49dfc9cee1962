use async_trait::async_trait;
use std::collections::{ HashMap, VecDeque };
use std::time::Instant;
use tokio::sync::Mutex;

use super::{ RateLimitConfig, RateLimitError, RateLimiter };

/// Process-wide sliding-window limiter keyed by client address.
///
/// Each client keeps the instants of its admitted requests. A request is
/// admitted only while fewer than `max_requests` admissions fall inside the
/// trailing `window`, so no interval of that length ever holds more.
/// Rejected requests are not recorded. All keys share one mutex, so the
/// purge, count and record performed by `admit_at` happen as one step.
pub struct MemoryRateLimiter {
    config: RateLimitConfig,
    entries: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl MemoryRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn admit_at(&self, client_key: &str, now: Instant) -> Result<(), RateLimitError> {
        let mut entries = self.entries.lock().await;
        let window = self.config.window;

        entries.retain(|_, admitted| {
            while admitted.front().is_some_and(|t| now.saturating_duration_since(*t) >= window) {
                admitted.pop_front();
            }
            !admitted.is_empty()
        });

        let admitted = entries.entry(client_key.to_string()).or_default();
        if admitted.len() >= self.config.max_requests as usize {
            let oldest = admitted.front().copied().unwrap_or(now);
            return Err(RateLimitError::Exceeded {
                retry_after: window.saturating_sub(now.saturating_duration_since(oldest)),
            });
        }

        admitted.push_back(now);
        Ok(())
    }

    pub async fn tracked_clients(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl RateLimiter for MemoryRateLimiter {
    async fn admit(&self, client_key: &str) -> Result<(), RateLimitError> {
        self.admit_at(client_key, Instant::now()).await
    }
}
