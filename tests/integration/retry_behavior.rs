//! Integration tests for retry behavior
//!
//! Verifies the retry wrapper's attempt accounting and that the configured
//! policy is the one network clients run under.

use avalanche_data_downloader::config::Config;
use avalanche_data_downloader::retry::{RetryPolicy, DEFAULT_MAX_RETRIES};
use std::cell::Cell;
use std::time::Duration;

#[test]
fn test_retry_runs_max_retries_plus_one_attempts() {
    let policy = RetryPolicy::new(Duration::from_millis(1), 3);
    let attempts = Cell::new(0u32);

    let result: Result<(), String> = policy.run("failing op", || {
        attempts.set(attempts.get() + 1);
        Err(format!("attempt {}", attempts.get()))
    });

    assert_eq!(attempts.get(), 4);
    assert_eq!(result, Err("attempt 4".to_string()));
}

#[test]
fn test_retry_recovers_mid_sequence() {
    let policy = RetryPolicy::new(Duration::from_millis(1), 5);
    let attempts = Cell::new(0u32);

    let result: Result<&str, String> = policy.run("flaky op", || {
        attempts.set(attempts.get() + 1);
        if attempts.get() < 3 {
            Err("transient".to_string())
        } else {
            Ok("recovered")
        }
    });

    assert_eq!(result, Ok("recovered"));
    assert_eq!(attempts.get(), 3);
}

#[test]
fn test_config_carries_default_retry_policy() {
    let config = Config::default();
    assert_eq!(config.retry.max_retries, DEFAULT_MAX_RETRIES);
    assert_eq!(config.retry.initial_wait, Duration::from_secs(1));
    // The backoff the clients will actually sleep
    assert_eq!(config.retry.backoff_delay(0), Duration::from_secs(1));
    assert_eq!(config.retry.backoff_delay(3), Duration::from_secs(8));
}
