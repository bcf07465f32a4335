use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Fixed-interval retry: the operation runs once, then up to `retry_count`
/// more times with `interval` between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retry_count: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_count: 0,
            interval: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(retry_count: u32, interval: Duration) -> Self {
        Self {
            retry_count,
            interval,
        }
    }

    pub fn max_attempts(&self) -> u64 {
        u64::from(self.retry_count) + 1
    }

    /// Executes the operation under the policy. Every failure is retried; once
    /// the attempts are exhausted the last error is returned.
    pub async fn run<F, Fut, T, E>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt: u32 = 0;

        loop {
            match op().await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    if attempt >= self.retry_count {
                        return Err(err);
                    }

                    attempt += 1;
                    warn!(
                        error = %err,
                        attempt,
                        max_attempts = self.max_attempts(),
                        delay = ?self.interval,
                        "{what} failed, retrying"
                    );
                    sleep(self.interval).await;
                }
            }
        }
    }
}
