//! Bounded retry with exponential backoff for transient backend calls.

use std::future::Future;
use std::time::Duration;

const BASE_BACKOFF_MS: u64 = 200;

/// Run `op` up to `max_attempts` times, sleeping `200ms * 2^n` between
/// attempts, retrying only while `retryable(&err)` holds.
///
/// The last error is returned unchanged when attempts are exhausted.
pub async fn with_retries<T, E, F, Fut>(
    op_name: &str,
    max_attempts: u32,
    retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= max_attempts || !retryable(&err) {
                    return Err(err);
                }
                let backoff = Duration::from_millis(BASE_BACKOFF_MS << (attempt - 1));
                tracing::warn!(
                    "{} failed (attempt {}/{}): {} - retrying in {:?}",
                    op_name,
                    attempt,
                    max_attempts,
                    err,
                    backoff
                );
                tokio::time::sleep(backoff).await;
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn returns_first_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = with_retries("op", 3, |_| true, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42) }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = with_retries("op", 3, |_| true, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 { Err("transient".to_string()) } else { Ok(7) }
            }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = with_retries("op", 5, |_| false, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("fatal".to_string()) }
        })
        .await;
        assert_eq!(result, Err("fatal".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
