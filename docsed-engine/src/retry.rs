//! Bounded retry with exponential backoff.
//!
//! Wraps every network call the engine makes. Rate limits and transient
//! server failures back off and retry within an attempt count and an elapsed
//! budget; anything else returns immediately. A cancellation signal aborts
//! the wait between attempts without issuing further calls.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime};

use crate::service::ServiceError;

/// A shared cancellation flag, checked before every attempt and while
/// sleeping between attempts.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            max_elapsed: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries; useful in tests and dry runs.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            max_elapsed: Duration::ZERO,
        }
    }

    /// Run `call`, retrying while `retryable` approves the error and the
    /// attempt/elapsed budgets hold. The last error is surfaced when the
    /// budget runs out.
    pub fn run<T>(
        &self,
        cancel: &CancelToken,
        retryable: impl Fn(&ServiceError) -> bool,
        mut call: impl FnMut() -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let started = Instant::now();
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(ServiceError::Cancelled);
            }
            let error = match call() {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            attempt += 1;
            let out_of_budget =
                attempt >= self.max_attempts || started.elapsed() >= self.max_elapsed;
            if !retryable(&error) || out_of_budget {
                return Err(error);
            }
            let backoff = self.backoff_for(attempt);
            tracing::warn!(%error, attempt, ?backoff, "transient service error, backing off");
            if !sleep_unless_cancelled(backoff, cancel) {
                return Err(ServiceError::Cancelled);
            }
        }
    }

    /// Exponential backoff with jitter, capped at `max_backoff`. Jitter is
    /// up to a quarter of the base, derived from the clock's sub-second
    /// noise.
    fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let base = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_backoff);
        base + jitter(base / 4)
    }
}

fn jitter(bound: Duration) -> Duration {
    let bound_ms = u32::try_from(bound.as_millis()).unwrap_or(u32::MAX);
    if bound_ms == 0 {
        return Duration::ZERO;
    }
    let noise = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |d| d.subsec_nanos());
    Duration::from_millis(u64::from(noise % bound_ms))
}

/// Sleep in short slices so a cancellation lands promptly. Returns false if
/// cancelled mid-wait.
fn sleep_unless_cancelled(total: Duration, cancel: &CancelToken) -> bool {
    const SLICE: Duration = Duration::from_millis(50);
    let deadline = Instant::now() + total;
    while Instant::now() < deadline {
        if cancel.is_cancelled() {
            return false;
        }
        std::thread::sleep(SLICE.min(deadline.saturating_duration_since(Instant::now())));
    }
    !cancel.is_cancelled()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            max_elapsed: Duration::from_secs(5),
        }
    }

    #[test]
    fn transient_errors_retry_until_success() {
        let calls = Cell::new(0);
        let result = fast_policy().run(
            &CancelToken::new(),
            ServiceError::retryable_for_fetch,
            || {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Err(ServiceError::Transient("503".to_string()))
                } else {
                    Ok("done")
                }
            },
        );
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn permanent_errors_return_immediately() {
        let calls = Cell::new(0);
        let result: Result<(), _> = fast_policy().run(
            &CancelToken::new(),
            ServiceError::retryable_for_fetch,
            || {
                calls.set(calls.get() + 1);
                Err(ServiceError::Permanent("400".to_string()))
            },
        );
        assert!(matches!(result, Err(ServiceError::Permanent(_))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn exhausted_budget_surfaces_last_error() {
        let calls = Cell::new(0);
        let result: Result<(), _> = fast_policy().run(
            &CancelToken::new(),
            ServiceError::retryable_for_fetch,
            || {
                calls.set(calls.get() + 1);
                Err(ServiceError::RateLimited(format!("attempt {}", calls.get())))
            },
        );
        assert_eq!(calls.get(), 4);
        assert!(matches!(result, Err(ServiceError::RateLimited(msg)) if msg == "attempt 4"));
    }

    #[test]
    fn mutate_does_not_retry_transient_failures() {
        let calls = Cell::new(0);
        let result: Result<(), _> = fast_policy().run(
            &CancelToken::new(),
            ServiceError::retryable_for_mutate,
            || {
                calls.set(calls.get() + 1);
                Err(ServiceError::Transient("502 mid-batch".to_string()))
            },
        );
        assert_eq!(calls.get(), 1);
        assert!(matches!(result, Err(ServiceError::Transient(_))));
    }

    #[test]
    fn cancellation_preempts_the_first_attempt() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let result: Result<(), _> = fast_policy().run(
            &cancel,
            ServiceError::retryable_for_fetch,
            || Ok(()),
        );
        assert_eq!(result, Err(ServiceError::Cancelled));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(400),
            max_elapsed: Duration::from_secs(60),
        };
        assert!(policy.backoff_for(1) >= Duration::from_millis(100));
        assert!(policy.backoff_for(4) >= Duration::from_millis(400));
        assert!(policy.backoff_for(9) <= Duration::from_millis(500));
    }
}
