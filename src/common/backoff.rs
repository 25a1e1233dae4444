//! Retry with exponential backoff
//!
//! Callers that want retries for flaky endpoints wrap the call here. The
//! one-shot token refresh on 401 lives in `RequestService`.

use std::future::Future;
use std::time::Duration;

use super::Result;

/// Run `op` up to `max_attempts` times, sleeping `base_delay * 2^(n-1)`
/// between attempts. Returns the last error when every attempt fails.
///
/// The closure receives the 1-based attempt number.
pub async fn retry<T, F, Fut>(max_attempts: u32, base_delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= max_attempts => return Err(e),
            Err(e) => {
                let delay = base_delay.saturating_mul(1 << (attempt - 1).min(16));
                tracing::debug!(attempt, ?delay, "Attempt failed, retrying: {}", e);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Error;

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_failures() {
        let start = tokio::time::Instant::now();
        let result = retry(3, Duration::from_millis(100), |attempt| async move {
            if attempt < 3 {
                Err(Error::Internal(format!("attempt {attempt}")))
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        // 100ms + 200ms of backoff
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_returns_last_error() {
        let mut calls = 0;
        let result: Result<()> = retry(2, Duration::from_millis(10), |attempt| {
            calls += 1;
            async move { Err(Error::Internal(format!("attempt {attempt}"))) }
        })
        .await;

        assert_eq!(calls, 2);
        assert!(matches!(result, Err(Error::Internal(msg)) if msg == "attempt 2"));
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let result = retry(0, Duration::ZERO, |_| async { Ok::<_, Error>("done") }).await;
        assert_eq!(result.unwrap(), "done");
    }
}
