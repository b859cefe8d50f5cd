//! Bounded retry with exponential backoff for external calls.
//!
//! Both the embedding and completion clients run their requests through
//! one [`RetryPolicy`], so transient/fatal classification lives in one
//! place instead of ad hoc loops at each call site. Backoff doubles per
//! attempt (capped at 2^5 times the base delay).

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Failure classification for a single external call attempt.
#[derive(Debug)]
pub enum CallError {
    /// Rate limit, server error, network failure, or timeout; eligible
    /// for another attempt.
    Transient(String),
    /// Auth or malformed-request failure; retrying cannot help.
    Fatal(String),
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(500),
        }
    }

    /// Run `op` until it succeeds, fails fatally, or attempts run out.
    /// Returns the last error message on exhaustion.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, String>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let mut last_err = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                let delay = self.base_delay * (1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(CallError::Fatal(msg)) => return Err(msg),
                Err(CallError::Transient(msg)) => {
                    warn!(
                        call = what,
                        attempt = attempt + 1,
                        error = %msg,
                        "transient failure, will retry"
                    );
                    last_err = Some(msg);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| format!("{what} failed with no attempts made")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = fast_policy(3)
            .run("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(CallError::Transient("flaky".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<i32, String> = fast_policy(5)
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(CallError::Fatal("bad request".into())) }
            })
            .await;
        assert_eq!(result.unwrap_err(), "bad request");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<i32, String> = fast_policy(3)
            .run("test", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(CallError::Transient(format!("attempt {n}"))) }
            })
            .await;
        assert_eq!(result.unwrap_err(), "attempt 2");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
