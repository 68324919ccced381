// 🔁 Retry - bounded attempts, fixed delay, network failures only

use super::LedgerError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        RetryPolicy { max_retries, delay }
    }

    /// Capped at `u32::MAX` for absurd retry settings.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(5, Duration::from_secs(2))
    }
}

/// Run `op` until it succeeds, fails with a non-network error, or the
/// policy's attempts are used up. The last error is returned as-is.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, LedgerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LedgerError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_retryable() && attempt < policy.max_attempts() => {
                warn!(
                    "⚠️  {} failed (attempt {}/{}): {}",
                    what,
                    attempt,
                    policy.max_attempts(),
                    e
                );
                debug!("Retrying {} in {}ms", what, policy.delay.as_millis());
                sleep(policy.delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}
