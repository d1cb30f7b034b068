//! Bounded retry policy for transient network operations
//!
//! Only network calls are retried (bus connect, directory discovery,
//! membership join). Lifecycle and validation errors are returned to the
//! caller directly and never pass through a [`Retrier`].

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Retrier {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl Retrier {
    /// Retry with the same delay between every attempt
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay,
        }
    }

    /// Retry with a doubling delay, starting at `initial_delay` and capped at `max_delay`
    pub fn exponential(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay: max_delay.max(initial_delay),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after the given failed attempt (zero based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds or the attempts are exhausted
    ///
    /// Returns the error of the last attempt.
    pub async fn run<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_if(op, |_| true).await
    }

    /// Like [`Retrier::run`], but gives up immediately on errors `should_retry` rejects
    pub async fn run_if<T, E, F, Fut, P>(&self, mut op: F, should_retry: P) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let attempts = self.max_attempts();
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    attempt += 1;
                    if attempt >= attempts || !should_retry(&e) {
                        return Err(e);
                    }
                    warn!(
                        attempt,
                        max_attempts = attempts,
                        "Operation failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(self.delay_for(attempt - 1)).await;
                }
            }
        }
    }
}
