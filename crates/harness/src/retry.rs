//! Bounded retry for flaky UI interactions
//!
//! Two retry regimes exist in the harness and must not be conflated: the
//! readiness probe is bounded by wall clock (see [`crate::probe`]), while UI
//! stability is bounded by attempt count regardless of elapsed time. An
//! element that never stabilizes within a handful of polls indicates a
//! scenario bug or an application regression, not slow startup.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::debug;

use crate::scenario::RetrySpec;

/// Boxed attempt future, borrowing the caller's context for one attempt
pub type AttemptFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + 'a>>;

/// Count-bounded retry with a fixed delay between attempts
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

/// All allowed attempts failed; carries the last error for diagnostics
#[derive(Debug)]
pub struct Exhausted<E> {
    pub attempts: u32,
    pub last: E,
}

impl Default for RetryPolicy {
    /// Ten attempts, half a second apart. Matches the observed cadence for
    /// dropdown options that lag behind client-side animation.
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// A policy that invokes the operation exactly once
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn from_spec(spec: RetrySpec) -> Self {
        Self::new(spec.max_attempts, Duration::from_millis(spec.delay_ms))
    }

    /// Invoke `op` against `ctx` up to `max_attempts` times, sleeping
    /// `delay` between attempts, and return the first success. No further
    /// invocations happen after a success. `should_retry` decides whether a
    /// given error is transient; a `false` stops immediately with the
    /// attempts made so far.
    ///
    /// The operation receives the context back on every attempt so callers
    /// can retry actions that mutably borrow a driver.
    pub async fn run<C, T, E, F, P>(
        &self,
        ctx: &mut C,
        mut op: F,
        mut should_retry: P,
    ) -> Result<T, Exhausted<E>>
    where
        F: for<'a> FnMut(&'a mut C) -> AttemptFuture<'a, T, E>,
        P: FnMut(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(ctx).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.max_attempts || !should_retry(&e) => {
                    return Err(Exhausted {
                        attempts: attempt,
                        last: e,
                    });
                }
                Err(e) => {
                    debug!("attempt {}/{} failed: {}", attempt, self.max_attempts, e);
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}
