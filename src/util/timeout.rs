//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::{SwarmError, TimeoutScope};

/// Wrap a future with a timeout for the given scope.
///
/// The inner future is dropped when the deadline passes, so any guards it
/// holds (call-stack entries, session locks) are released by their `Drop`
/// impls.
pub async fn with_timeout<T>(
    scope: TimeoutScope,
    duration: Option<Duration>,
    future: impl Future<Output = Result<T, SwarmError>>,
) -> Result<T, SwarmError> {
    let Some(duration) = duration else {
        return future.await;
    };
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(SwarmError::Timeout {
            scope,
            after_ms: duration.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expired_future_reports_scope() {
        let err = with_timeout(TimeoutScope::Turn, Some(Duration::from_millis(10)), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            SwarmError::Timeout {
                scope: TimeoutScope::Turn,
                after_ms: 10
            }
        ));
    }

    #[tokio::test]
    async fn no_duration_means_no_deadline() {
        let value = with_timeout(TimeoutScope::Run, None, async { Ok(3) }).await.unwrap();
        assert_eq!(value, 3);
    }
}
