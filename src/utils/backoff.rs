//! Exponential backoff policy for retrying transient failures.
//!
//! The policy is a plain value applied explicitly at each call site:
//!
//! ```rust,no_run
//! use plugreg_cli::utils::backoff::RetryPolicy;
//!
//! # async fn example() -> Result<(), std::io::Error> {
//! let policy = RetryPolicy::default(); // 4 attempts, 3s, 6s, 12s
//! let body = policy
//!     .run("tpope/vim-fugitive", || async { Ok::<_, std::io::Error>("feed") }, |e| {
//!         e.kind() == std::io::ErrorKind::TimedOut
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_retry::RetryIf;

use crate::constants::{RETRY_ATTEMPTS, RETRY_BACKOFF_FACTOR, RETRY_BASE_DELAY};

/// How often and how patiently to retry an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier applied to the delay after every retry
    pub factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: RETRY_ATTEMPTS,
            base_delay: RETRY_BASE_DELAY,
            factor: RETRY_BACKOFF_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// A policy that runs the operation exactly once.
    pub const fn none() -> Self {
        Self {
            attempts: 1,
            base_delay: Duration::ZERO,
            factor: 1,
        }
    }

    /// Delays slept between consecutive attempts.
    ///
    /// There is one delay fewer than there are attempts; the last attempt is
    /// never followed by a sleep.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + Send + 'static {
        let mut next = self.base_delay;
        let factor = self.factor;
        (1..self.attempts.max(1)).map(move |_| {
            let current = next;
            next = next.saturating_mul(factor);
            current
        })
    }

    /// Run `action` until it succeeds, `should_retry` rejects its error, or
    /// the attempts are used up. The last error is returned unchanged.
    pub async fn run<T, E, A, Fut, C>(&self, label: &str, action: A, mut should_retry: C) -> Result<T, E>
    where
        A: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: FnMut(&E) -> bool,
        E: Display,
    {
        let retry_label = label.to_string();
        let delays = self.delays().inspect(move |delay| {
            tracing::warn!(
                target: "retry",
                "({}) Retrying in {} seconds...",
                retry_label,
                delay.as_secs_f64()
            );
        });

        RetryIf::start(delays, action, |error: &E| {
            let retry = should_retry(error);
            if retry {
                tracing::debug!(target: "retry", "({}) transient failure: {}", label, error);
            }
            retry
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_default_delays_double() {
        let delays: Vec<_> = RetryPolicy::default().delays().collect();
        assert_eq!(
            delays,
            vec![Duration::from_secs(3), Duration::from_secs(6), Duration::from_secs(12)]
        );
    }

    #[test]
    fn test_single_attempt_has_no_delays() {
        assert_eq!(RetryPolicy::none().delays().count(), 0);
    }

    fn instant(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            base_delay: Duration::ZERO,
            factor: 2,
        }
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<u32, String> = instant(4)
            .run(
                "test",
                || {
                    let counter = Arc::clone(&counter);
                    async move {
                        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                        if n < 3 { Err("transient".to_string()) } else { Ok(n) }
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_all_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), String> = instant(4)
            .run(
                "test",
                || {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err("still down".to_string())
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(result, Err("still down".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), String> = instant(4)
            .run(
                "test",
                || {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err("no commits".to_string())
                    }
                },
                |e| e != "no commits",
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
