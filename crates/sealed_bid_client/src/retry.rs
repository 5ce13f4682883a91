//! Bounded polling for completions that have no push notification
//!
//! Both the MPC network and the ledger are observed by re-reading state on a
//! fixed cadence. The policy is a plain value so orchestrators can be driven
//! by a fake clock in tests.

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::Result;

/// Time source used by every polling loop
#[async_trait]
pub trait Clock: Send + Sync {
    /// Monotonic time since the clock was created.
    fn elapsed(&self) -> Duration;

    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by the tokio timer
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    started: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Attempt budget for one polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total checks, including the first one
    pub max_attempts: u32,
    /// Delay between consecutive checks
    pub interval: Duration,
    /// Client-side deadline; the loop never sleeps past it
    pub timeout: Option<Duration>,
}

impl RetryPolicy {
    /// MXE public key fetch while keygen may still be running
    pub const MXE_KEY: RetryPolicy = RetryPolicy::new(5, Duration::from_secs(2));

    /// Waiting for a queued bid computation to land
    pub const COMPUTATION: RetryPolicy =
        RetryPolicy::new(60, Duration::from_secs(1)).with_timeout(Duration::from_secs(60));

    /// Waiting for the reveal result record to flip to revealed
    pub const REVEAL: RetryPolicy =
        RetryPolicy::new(60, Duration::from_secs(2)).with_timeout(Duration::from_secs(150));

    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            timeout: None,
        }
    }

    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run `check` until it yields a value or the budget runs out.
    ///
    /// `check` receives the 1-based attempt number. `Ok(None)` means "not
    /// yet"; an `Err` aborts the loop immediately.
    pub async fn poll<T, F, Fut>(&self, clock: &dyn Clock, mut check: F) -> Result<Polled<T>>
    where
        F: FnMut(u32) -> Fut + Send,
        Fut: Future<Output = Result<Option<T>>> + Send,
        T: Send,
    {
        let max_attempts = self.max_attempts.max(1);
        let started = clock.elapsed();
        let mut attempt = 0;

        loop {
            attempt += 1;
            if let Some(value) = check(attempt).await? {
                return Ok(Polled::Ready {
                    value,
                    attempts: attempt,
                });
            }

            let elapsed = clock.elapsed().saturating_sub(started);
            let past_deadline = self.timeout.is_some_and(|timeout| {
                elapsed
                    .checked_add(self.interval)
                    .map_or(true, |wake| wake > timeout)
            });
            if attempt >= max_attempts || past_deadline {
                return Ok(Polled::Exhausted {
                    attempts: attempt,
                    elapsed,
                });
            }

            clock.sleep(self.interval).await;
        }
    }
}

/// Result of a polling loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Polled<T> {
    Ready { value: T, attempts: u32 },
    Exhausted { attempts: u32, elapsed: Duration },
}
