//! Bounded retries for external data fetches.

use database::SourceError;
use std::future::Future;
use tokio::time::{Duration, sleep};
use tracing::warn;

/// Runs `op` until it succeeds, fails permanently, or `attempts` transient
/// failures have been seen. The wait doubles after each transient failure,
/// starting at `backoff`.
pub async fn with_retry<T, F, Fut>(
    what: &str,
    attempts: u32,
    backoff: Duration,
    mut op: F,
) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let attempts = attempts.max(1);
    let mut delay = backoff;
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < attempts => {
                warn!(what, attempt, attempts, delay_ms = delay.as_millis() as u64, %error, "Transient fetch failure, retrying");
                sleep(delay).await;
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn failing(transient_failures: u32, calls: Arc<AtomicU32>) -> impl FnMut() -> std::future::Ready<Result<u32, SourceError>> {
        move || {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(if call < transient_failures {
                Err(SourceError::Transient("timeout".to_string()))
            } else {
                Ok(call)
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_with_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = tokio::time::Instant::now();
        let value = with_retry("history", 3, Duration::from_millis(100), failing(2, calls.clone()))
            .await
            .unwrap();
        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_are_bounded() {
        let calls = Arc::new(AtomicU32::new(0));
        let err = with_retry("history", 3, Duration::from_millis(10), failing(10, calls.clone()))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let err = with_retry("history", 5, Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Err::<(), _>(SourceError::Permanent("unknown market".to_string())))
        })
        .await
        .unwrap_err();
        assert_eq!(err, SourceError::Permanent("unknown market".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
