//! Retry wrapper with exponential backoff
//!
//! Every network call in this crate goes through [`RetryPolicy::run`]. Any
//! failure is retried identically (no per-error differentiation, no jitter):
//! sleep the current wait, double it, try again, and give up once the retry
//! ceiling is exceeded, propagating the final error to the caller.

use std::time::Duration;
use tracing::warn;

/// Default number of retries for failed network operations.
/// 5 retries with exponential backoff recovers from transient outages while
/// keeping the worst case bounded (total wait 1+2+4+8+16 = 31s at the default
/// initial wait).
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default initial backoff delay in milliseconds.
/// 1 second is long enough for upstream hiccups to clear but short enough to
/// not overly delay recovery.
pub const DEFAULT_INITIAL_WAIT_MS: u64 = 1000;

/// Retry policy for a fallible operation
///
/// The first retry sleeps `initial_wait`; each subsequent retry doubles the
/// sleep. There is no ceiling on an individual sleep, only on the number of
/// retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Sleep before the first retry
    pub initial_wait: Duration,
    /// Retries allowed after the initial attempt
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            initial_wait: Duration::from_millis(DEFAULT_INITIAL_WAIT_MS),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with explicit parameters.
    pub fn new(initial_wait: Duration, max_retries: u32) -> Self {
        RetryPolicy {
            initial_wait,
            max_retries,
        }
    }

    /// Backoff delay before retry number `retry` (zero-based).
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        self.initial_wait.saturating_mul(2u32.saturating_pow(retry))
    }

    /// Invoke `operation` until it succeeds or the retry ceiling is exceeded.
    ///
    /// Runs at most `max_retries + 1` attempts. Each retry is preceded by a
    /// blocking backoff sleep and logged with the attempt number and wait.
    /// The error returned is the one from the final attempt.
    pub fn run<T, E, F>(&self, what: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: std::fmt::Display,
    {
        let mut failures: u32 = 0;
        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    failures += 1;
                    if failures > self.max_retries {
                        return Err(err);
                    }
                    let wait = self.backoff_delay(failures - 1);
                    warn!(
                        attempt = failures,
                        max_retries = self.max_retries,
                        wait_secs = wait.as_secs_f64(),
                        "{what} failed, retrying: {err}"
                    );
                    std::thread::sleep(wait);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_backoff_progression() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(1000));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(2000));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(4000));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(8000));
        assert_eq!(policy.backoff_delay(4), Duration::from_millis(16000));
        // No ceiling on individual sleeps
        assert_eq!(policy.backoff_delay(10), Duration::from_millis(1_024_000));
    }

    #[test]
    fn test_backoff_scales_with_initial_wait() {
        let policy = RetryPolicy::new(Duration::from_millis(250), 5);
        let sleeps: Vec<Duration> = (0..4).map(|n| policy.backoff_delay(n)).collect();
        assert_eq!(
            sleeps,
            vec![
                Duration::from_millis(250),
                Duration::from_millis(500),
                Duration::from_millis(1000),
                Duration::from_millis(2000),
            ]
        );
    }

    #[test]
    fn test_run_succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(Duration::from_millis(1), 5);
        let attempts = Cell::new(0u32);
        let result: Result<u32, String> = policy.run("test op", || {
            attempts.set(attempts.get() + 1);
            if attempts.get() <= 3 {
                Err("transient".to_string())
            } else {
                Ok(42)
            }
        });
        assert_eq!(result, Ok(42));
        assert_eq!(attempts.get(), 4);
    }

    #[test]
    fn test_run_propagates_after_ceiling() {
        let policy = RetryPolicy::new(Duration::from_millis(1), 2);
        let attempts = Cell::new(0u32);
        let result: Result<u32, String> = policy.run("test op", || {
            attempts.set(attempts.get() + 1);
            Err(format!("failure {}", attempts.get()))
        });
        // max_retries + 1 total attempts, final error propagated
        assert_eq!(attempts.get(), 3);
        assert_eq!(result, Err("failure 3".to_string()));
    }

    #[test]
    fn test_run_no_retries_single_attempt() {
        let policy = RetryPolicy::new(Duration::from_millis(1), 0);
        let attempts = Cell::new(0u32);
        let result: Result<(), String> = policy.run("test op", || {
            attempts.set(attempts.get() + 1);
            Err("nope".to_string())
        });
        assert_eq!(attempts.get(), 1);
        assert!(result.is_err());
    }

    #[test]
    fn test_run_first_try_success_never_sleeps() {
        // A huge initial wait proves success paths never touch the backoff.
        let policy = RetryPolicy::new(Duration::from_secs(3600), 5);
        let result: Result<&str, String> = policy.run("test op", || Ok("done"));
        assert_eq!(result, Ok("done"));
    }
}
