use std::future::Future;
use std::time::Duration;

use tracing::debug;

use trawl_common::RetryConfig;

use crate::error::CollectError;

/// Bounded local retry for transient reads. Knows nothing about passes or
/// convergence; the collector decides what an exhausted retry means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.attempts, Duration::from_millis(config.delay_ms))
    }
}

impl RetryPolicy {
    /// `attempts` is clamped to at least one.
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Run `op` until it succeeds or the attempts are used up. The last
    /// error is returned as [`CollectError::TransientRead`].
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, CollectError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.attempts => {
                    debug!(attempt, max = self.attempts, error = %e, "Read failed, retrying");
                    attempt += 1;
                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                }
                Err(e) => {
                    return Err(CollectError::TransientRead {
                        attempts: self.attempts,
                        source: e,
                    })
                }
            }
        }
    }
}
