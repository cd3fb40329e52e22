//! Bounded-retry readiness polling.
//!
//! Everything the VM lifecycle waits on (the control socket appearing, the
//! guest acquiring an address, the remote-access port opening) goes through
//! the same primitive: evaluate a predicate up to a fixed number of times
//! with a fixed interval in between, and give up with [`TimedOut`] once the
//! attempt budget is exhausted. There is no external cancellation channel;
//! the bound is the only way out.

use std::future::Future;
use std::time::{Duration, Instant};

/// The probe exhausted its attempt budget without the predicate holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedOut {
    /// Number of predicate evaluations performed.
    pub attempts: u32,
    /// Wall-clock time spent in the probe.
    pub elapsed: Duration,
}

impl std::fmt::Display for TimedOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "timed out after {} attempts ({:?})",
            self.attempts, self.elapsed
        )
    }
}

impl std::error::Error for TimedOut {}

/// Bounded-retry polling primitive.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessProbe {
    interval: Duration,
    max_attempts: u32,
}

impl ReadinessProbe {
    /// Create a probe that evaluates its predicate up to `max_attempts`
    /// times, sleeping `interval` between attempts.
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Poll interval between attempts.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Maximum number of predicate evaluations.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Evaluate `check` until it returns true or the budget is exhausted.
    ///
    /// Returns the 1-based attempt number on which the predicate first held.
    /// The probe sleeps between attempts but not after the last one, so the
    /// minimum elapsed time on timeout is `(max_attempts - 1) * interval`.
    pub async fn wait<F, Fut>(&self, mut check: F) -> Result<u32, TimedOut>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let start = Instant::now();
        for attempt in 1..=self.max_attempts {
            if check().await {
                tracing::trace!(attempt, "readiness predicate satisfied");
                return Ok(attempt);
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }
        Err(TimedOut {
            attempts: self.max_attempts,
            elapsed: start.elapsed(),
        })
    }

    /// Like [`wait`](Self::wait), but for checks that produce a value.
    ///
    /// Evaluates `check` until it returns `Some`, yielding that value, with
    /// the same attempt budget and sleep behavior as `wait`.
    pub async fn wait_for<F, Fut, T>(&self, mut check: F) -> Result<T, TimedOut>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let start = Instant::now();
        for attempt in 1..=self.max_attempts {
            if let Some(value) = check().await {
                tracing::trace!(attempt, "readiness predicate satisfied");
                return Ok(value);
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }
        Err(TimedOut {
            attempts: self.max_attempts,
            elapsed: start.elapsed(),
        })
    }
}
