//! Bounded retry for outbound LLM calls.
//!
//! Only [`ProviderError::Transient`] is retried, immediately and without
//! backoff. Every other failure is returned on the first attempt.

use std::error::Error as StdError;
use std::future::Future;
use std::io;

use tracing::{error, warn};

use super::ProviderError;

/// Run `op` up to `max_attempts` times (the first call included).
///
/// A `max_attempts` of 0 is treated as 1.
pub async fn with_retry<T, F, Fut>(max_attempts: u32, mut op: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                warn!(attempt, max_attempts, error = %e, "transient LLM failure, retrying");
                attempt += 1;
            }
            Err(e) => {
                error!(attempt, max_attempts, error = %e, "LLM call failed");
                return Err(e);
            }
        }
    }
}

/// Map a transport error to a provider error.
///
/// Timeouts and connections closed under an in-flight request are transient;
/// everything else (refused connection, TLS, bad URL) is not.
pub(crate) fn classify_transport(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() || is_closed_connection(&e) {
        ProviderError::Transient(e.to_string())
    } else {
        ProviderError::Request(e.to_string())
    }
}

fn is_closed_connection(e: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(e);
    while let Some(err) = current {
        if let Some(io_err) = err.downcast_ref::<io::Error>() {
            if matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::NotConnected
            ) {
                return true;
            }
        }
        let msg = err.to_string().to_lowercase();
        if msg.contains("connection closed") || msg.contains("closed before message completed") {
            return true;
        }
        current = err.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_first_try() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, ProviderError>(7) }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_retry(3, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ProviderError::Transient("connection closed".into()))
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::Transient("connection closed".into())) }
        })
        .await;
        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(3, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::Request("HTTP 401".into())) }
        })
        .await;
        assert!(matches!(result, Err(ProviderError::Request(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);
        let _ = with_retry(0, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(ProviderError::Transient("timeout".into())) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_io_error_counts_as_closed() {
        let e = io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer");
        assert!(is_closed_connection(&e));
        let e = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert!(!is_closed_connection(&e));
    }
}
