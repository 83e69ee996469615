//! Bounded retry with exponential backoff for transient store failures.
//!
//! Only errors classified by [`StoreError::is_transient`] (I/O, SQLite
//! busy/locked) are retried; domain errors return immediately.  The session
//! layer uses this for presence writes, and any caller may wrap a store
//! operation the same way.

use std::thread;
use std::time::Duration;

use rand::Rng;

use crate::error::{Result, StoreError};

/// Backoff configuration for [`retry_transient`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Ceiling on the delay between attempts.
    pub max_backoff: Duration,
    /// Growth factor applied to the delay after each retry.
    pub multiplier: f64,
    /// Randomize each delay by ±30% to avoid lockstep retries.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Run `op`, retrying transient failures with exponential backoff.
///
/// Returns the first success, the first non-transient error, or the last
/// transient error once the attempt budget is spent.
pub fn retry_transient<T, F>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut backoff = policy.initial_backoff;
    let mut attempt = 1u32;

    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = apply_jitter(backoff, policy.jitter);
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient store error, retrying"
                );
                thread::sleep(delay);
                backoff = next_backoff(backoff, policy);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn next_backoff(current: Duration, policy: &RetryPolicy) -> Duration {
    let scaled = current.as_millis() as f64 * policy.multiplier;
    Duration::from_millis(scaled as u64).min(policy.max_backoff)
}

fn apply_jitter(base: Duration, jitter: bool) -> Duration {
    if !jitter {
        return base;
    }
    let factor = rand::thread_rng().gen_range(0.7..=1.3);
    Duration::from_millis((base.as_millis() as f64 * factor) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            multiplier: 2.0,
            jitter: false,
        }
    }

    fn transient() -> StoreError {
        StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "flaky"))
    }

    #[test]
    fn succeeds_first_try_without_retrying() {
        let calls = AtomicU32::new(0);

        let result = retry_transient(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        });

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);

        let result = retry_transient(&fast_policy(), || {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(transient())
            } else {
                Ok("ok")
            }
        });

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn exhausts_the_attempt_budget() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = retry_transient(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        });

        assert!(matches!(result, Err(StoreError::Io(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn domain_errors_are_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = retry_transient(&fast_policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::NotFound)
        });

        assert!(matches!(result, Err(StoreError::NotFound)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_growth_respects_the_ceiling() {
        let policy = fast_policy();
        let grown = next_backoff(Duration::from_millis(1), &policy);
        assert_eq!(grown, Duration::from_millis(2));

        let capped = next_backoff(Duration::from_millis(100), &policy);
        assert_eq!(capped, policy.max_backoff);
    }
}
