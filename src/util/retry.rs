//! Retry with exponential backoff and jitter.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SwarmError;

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Initial backoff in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound for a single backoff, in milliseconds.
    pub max_backoff_ms: u64,
    /// Backoff multiplier.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Execute an async operation, retrying errors classified as retryable.
    ///
    /// `on_retry` is called with the 1-based attempt number that failed and
    /// its error, before sleeping. Once the attempt budget is spent a
    /// retryable error surfaces as [`SwarmError::RetriesExhausted`];
    /// non-retryable errors are returned unchanged on first sight.
    pub async fn execute<F, Fut, T, R>(&self, mut operation: F, mut on_retry: R) -> Result<T, SwarmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SwarmError>>,
        R: FnMut(u32, &SwarmError),
    {
        let max_attempts = self.max_attempts.max(1);
        let mut backoff = Duration::from_millis(self.initial_backoff_ms);
        let max_backoff = Duration::from_millis(self.max_backoff_ms);

        for attempt in 1..=max_attempts {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(err);
            }
            if attempt == max_attempts {
                if max_attempts == 1 {
                    return Err(err);
                }
                return Err(SwarmError::RetriesExhausted {
                    attempts: attempt,
                    last_error: err.to_string(),
                });
            }

            tracing::warn!(
                attempt,
                max_attempts,
                error = %err,
                "Retrying transport call after error"
            );
            on_retry(attempt, &err);

            let wait = match err {
                SwarmError::RateLimited {
                    retry_after_ms: Some(ms),
                } => Duration::from_millis(ms).min(max_backoff),
                _ => {
                    // Jitter: 75%-125% of backoff
                    let jitter_factor = 0.75 + (rand_factor() * 0.5);
                    Duration::from_secs_f64(backoff.as_secs_f64() * jitter_factor)
                }
            };
            tokio::time::sleep(wait).await;

            backoff = Duration::from_secs_f64(
                (backoff.as_secs_f64() * self.multiplier).min(max_backoff.as_secs_f64()),
            );
        }

        Err(SwarmError::InvalidState("retry loop ended without a result".into()))
    }
}

/// Pseudo-random factor in [0, 1).
fn rand_factor() -> f64 {
    (uuid::Uuid::new_v4().as_u128() % 10_000) as f64 / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let mut retries = Vec::new();
        let value = fast_policy(3)
            .execute(
                move || async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(SwarmError::Network("reset".into()))
                    } else {
                        Ok(7)
                    }
                },
                |attempt, _| retries.push(attempt),
            )
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(retries, vec![1]);
    }

    #[tokio::test]
    async fn terminal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let err = fast_policy(5)
            .execute(
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(SwarmError::Authentication("bad key".into()))
                },
                |_, _| {},
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SwarmError::Authentication(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_budget_is_reported() {
        let err = fast_policy(2)
            .execute(
                || async { Err::<(), _>(SwarmError::RateLimited { retry_after_ms: Some(1) }) },
                |_, _| {},
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SwarmError::RetriesExhausted { attempts: 2, .. }));
    }
}
