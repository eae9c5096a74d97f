//! Background task helpers
//!
//! Submissions and store writes are spawned, never awaited by phase logic.
//! Failures land in the log (and, for exhausted retries, in the configured
//! process-fatal callback) instead of propagating into the state machine.

use crate::errors::RoundResult;
use once_cell::sync::OnceCell;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// Callback invoked when a retried operation exhausts its attempts. This is
/// a process-fatal signal: the host is expected to shut down.
pub type RetryFailureCallback = Box<dyn Fn(&str) + Send + Sync>;

static RETRY_FAILURE_CALLBACK: OnceCell<RetryFailureCallback> = OnceCell::new();

/// Installs the process-fatal retry failure callback. Only the first call
/// takes effect.
pub fn set_retry_failure_callback(callback: RetryFailureCallback) {
    if RETRY_FAILURE_CALLBACK.set(callback).is_err() {
        warn!("Retry failure callback already installed");
    }
}

fn report_retry_failure(label: &str) {
    if let Some(callback) = RETRY_FAILURE_CALLBACK.get() {
        callback(label);
    }
}

/// Spawns a fire-and-forget task, logging its failure under `label`
pub fn spawn_logged<F>(label: &'static str, future: F)
where
    F: Future<Output = RoundResult<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(err) = future.await {
            error!("{} failed: {}", label, err);
        }
    });
}

/// Retries `operation` up to `attempts` times with doubling backoff. When
/// the final attempt fails, the retry failure callback fires and the last
/// error is returned.
pub async fn retry<T, F, Fut>(
    label: &str,
    attempts: u32,
    initial_backoff: Duration,
    mut operation: F,
) -> RoundResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RoundResult<T>>,
{
    let mut backoff = initial_backoff;
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts => {
                warn!("{} attempt {}/{} failed: {}", label, attempt, attempts, err);
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                attempt += 1;
            }
            Err(err) => {
                error!("{} failed after {} attempts: {}", label, attempts, err);
                report_retry_failure(label);
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RoundError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = retry("test", 5, Duration::from_millis(1), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(RoundError::Connection("transient".into()))
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: RoundResult<u32> = retry("test", 3, Duration::from_millis(1), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(RoundError::Connection("down".into()))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
