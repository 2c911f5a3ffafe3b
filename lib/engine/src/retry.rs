//! Bounded exponential backoff for transient step failures.

use crate::executor::StepError;
use crate::settings::RetrySettings;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retries an async operation on transient failures.
///
/// Built from [`RetrySettings`]; sleeps between attempts with
/// exponentially growing delays. Fatal (config) errors and exhausted
/// budgets return the last error unchanged.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    settings: RetrySettings,
}

impl RetryPolicy {
    /// Creates a policy from settings.
    #[must_use]
    pub fn new(settings: RetrySettings) -> Self {
        Self { settings }
    }

    /// Runs `op` up to `max_attempts` times.
    ///
    /// Only [`StepError::Transient`] triggers a retry; a config error
    /// propagates immediately.
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts are exhausted.
    pub async fn run<F, Fut, T>(&self, mut op: F) -> Result<T, StepError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StepError>>,
    {
        let attempts = self.settings.max_attempts.max(1);
        let mut delay_ms = self.settings.base_delay_ms as f64;

        for attempt in 1..=attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < attempts => {
                    warn!(attempt, reason = err.reason(), "transient step failure, retrying");
                    tokio::time::sleep(Duration::from_millis(delay_ms as u64)).await;
                    delay_ms *= self.settings.multiplier;
                }
                Err(err) => return Err(err),
            }
        }

        unreachable!("loop returns on the final attempt")
    }
}
