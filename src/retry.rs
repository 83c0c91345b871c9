//! Retry policy for network and browser calls.
//!
//! An operation reports `Ok(Some(value))` on success, `Ok(None)` when it produced nothing,
//! and `Err` on a fault. Empty results and faults are both retried; the caller can still
//! tell them apart once attempts are exhausted.

use std::time::Duration;

/// Default number of attempts.
pub const DEFAULT_RETRIES: u32 = 5;
/// Default pause between attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(10);

/// Blocks the current thread between attempts.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeper backed by `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<S: Sleeper + ?Sized> Sleeper for &S {
    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

/// Fixed-backoff retry policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy<S = ThreadSleeper> {
    retries: u32,
    backoff: Duration,
    sleeper: S,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRIES, DEFAULT_BACKOFF)
    }
}

impl RetryPolicy {
    pub fn new(retries: u32, backoff: Duration) -> Self {
        Self::with_sleeper(retries, backoff, ThreadSleeper)
    }
}

impl<S: Sleeper> RetryPolicy<S> {
    /// `retries` is the total number of attempts; at least one is always made.
    pub fn with_sleeper(retries: u32, backoff: Duration, sleeper: S) -> Self {
        Self {
            retries: retries.max(1),
            backoff,
            sleeper,
        }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Run `op` until it yields a value or attempts run out. No pause follows the final
    /// attempt. On exhaustion returns the last fault if any attempt faulted, else `Ok(None)`.
    pub fn run<T, E, F>(&self, label: &str, mut op: F) -> Result<Option<T>, E>
    where
        F: FnMut() -> Result<Option<T>, E>,
        E: std::fmt::Display,
    {
        let mut last_fault: Option<E> = None;
        for attempt in 1..=self.retries {
            match op() {
                Ok(Some(value)) => return Ok(Some(value)),
                Ok(None) => {
                    tracing::debug!("'{}' returned nothing (attempt {})", label, attempt);
                }
                Err(e) => {
                    tracing::debug!("'{}' failed (attempt {}): {}", label, attempt, e);
                    last_fault = Some(e);
                }
            }
            if attempt == self.retries {
                break;
            }
            tracing::debug!(
                "'{}' failed, retrying in {:.2} seconds",
                label,
                self.backoff.as_secs_f64()
            );
            self.sleeper.sleep(self.backoff);
        }
        tracing::warn!(
            "'{}' failed to execute after {} attempts",
            label,
            self.retries
        );
        match last_fault {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}
