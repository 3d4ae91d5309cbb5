use std::future::Future;
use std::time::Duration;

use reviewq_core::config::RetryConfig;

use crate::error::RemoteError;
use crate::Result;

/// Bounded exponential backoff for reads, and at most one retry for
/// mutations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub read_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub mutation_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            read_attempts: config.read_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            mutation_retries: config.mutation_retries.min(1),
        }
    }

    /// No waiting and no retries.
    pub fn none() -> Self {
        Self {
            read_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            mutation_retries: 0,
        }
    }

    /// Delay before retry number `retry` (0-based): `base * 2^retry`, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub async fn read<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable_read() && attempt < self.read_attempts => {
                    let delay = self.delay_for(attempt - 1);
                    tracing::debug!(what, attempt, ?delay, error = %e, "retrying read");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Only transient failures are retried; anything the server answered
    /// is final.
    pub async fn mutation<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retries = 0;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(RemoteError::Transient(msg)) if retries < self.mutation_retries => {
                    retries += 1;
                    tracing::debug!(what, error = %msg, "retrying mutation once");
                    tokio::time::sleep(self.delay_for(0)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
