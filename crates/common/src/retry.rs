//! Bounded retries for establishing connections at startup.
//!
//! Uses `backon` for exponential backoff with jitter.

use anyhow::Result;
use backon::{BackoffBuilder, ExponentialBuilder};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Backoff for initial broker and database connections
///
/// - Min delay: 500ms
/// - Max delay: 10s
/// - Max retries: `max_retries`
/// - Jitter enabled
pub fn startup_backoff(max_retries: usize) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(500))
        .with_max_delay(Duration::from_secs(10))
        .with_max_times(max_retries)
        .with_jitter()
}

/// Unbounded backoff for re-establishing a lost subscription
pub fn reconnect_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(30))
        .without_max_times()
        .with_jitter()
}

/// Run `operation` until it succeeds or the backoff is exhausted
///
/// Returns the last error once no retries remain.
pub async fn retry_with_backoff<T, F, Fut>(
    name: &str,
    backoff: ExponentialBuilder,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delays = backoff.build();
    let mut attempt = 1usize;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => match delays.next() {
                Some(delay) => {
                    warn!(
                        operation = name,
                        attempt,
                        backoff_ms = delay.as_millis() as u64,
                        error = %e,
                        "attempt failed, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => return Err(e.context(format!("{} failed after {} attempts", name, attempt))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_backoff(max_retries: usize) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(2))
            .with_max_times(max_retries)
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let result = retry_with_backoff("connect", fast_backoff(5), || {
            let calls = calls_clone.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(anyhow!("broker unavailable"))
                } else {
                    Ok("connected")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "connected");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_retries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let result: Result<()> = retry_with_backoff("connect", fast_backoff(2), || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(anyhow!("broker unavailable"))
            }
        })
        .await;

        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("connect failed after 3 attempts"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
