//! Exponential backoff for telemetry requests.

use crate::error::TelemetryError;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_retries: u32,
    /// Base delay in seconds for exponential backoff.
    pub base_delay_secs: u64,
    /// Maximum delay cap in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_secs: 1,
            max_delay_secs: 30,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given max retries and base delay.
    #[must_use]
    pub fn new(max_retries: u32, base_delay_secs: u64) -> Self {
        Self {
            max_retries,
            base_delay_secs,
            max_delay_secs: 30,
        }
    }

    /// Whether the error should be retried at the given attempt number.
    #[must_use]
    pub fn should_retry(&self, attempt: u32, error: &TelemetryError) -> bool {
        attempt < self.max_retries && error.is_transient()
    }

    /// Delay for the given attempt: `min(base * 2^attempt, max)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay_secs
            .saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_secs(exponential.min(self.max_delay_secs))
    }

    /// Execute an async operation, retrying transient failures.
    pub async fn execute<F, Fut, T>(
        &self,
        operation_name: &str,
        mut f: F,
    ) -> Result<T, TelemetryError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, TelemetryError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(
                            operation = operation_name,
                            attempt = attempt + 1,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(error) => {
                    if !self.should_retry(attempt, &error) {
                        if attempt > 0 {
                            warn!(
                                operation = operation_name,
                                attempts = attempt + 1,
                                error = %error,
                                "Operation failed after retries"
                            );
                        }
                        return Err(error);
                    }

                    let delay = self.delay_for(attempt);
                    debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        delay_secs = delay.as_secs(),
                        error = %error,
                        "Transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_exponentially_and_caps() {
        let policy = RetryPolicy::new(5, 1);
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(10), Duration::from_secs(30));
    }

    #[test]
    fn test_should_not_retry_non_transient() {
        let policy = RetryPolicy::default();
        let error = TelemetryError::AuthFailed("bad credentials".to_string());
        assert!(!policy.should_retry(0, &error));
    }

    #[test]
    fn test_should_retry_server_error_within_budget() {
        let policy = RetryPolicy::new(2, 1);
        let error = TelemetryError::UnexpectedStatus {
            status: 503,
            body: "unavailable".to_string(),
        };
        assert!(policy.should_retry(0, &error));
        assert!(policy.should_retry(1, &error));
        assert!(!policy.should_retry(2, &error));
    }
}
