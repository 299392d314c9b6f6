use crate::clock::Clock;
use crate::config::KeeperConfig;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; zero is treated as one.
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    #[must_use]
    pub fn from_config(config: &KeeperConfig) -> Self {
        Self::new(config.retry_attempts, config.retry_delay())
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Runs `op` until it succeeds or the attempt budget is spent, sleeping on
    /// `clock` between attempts.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt once all attempts have failed.
    pub async fn run<T, E, F, Fut>(&self, clock: &dyn Clock, what: &str, op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_if(clock, what, op, |_| true).await
    }

    /// Like [`RetryPolicy::run`], but gives up immediately on errors for which
    /// `retryable` returns false.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error, or the last error once the budget is spent.
    pub async fn run_if<T, E, F, Fut, P>(
        &self,
        clock: &dyn Clock,
        what: &str,
        mut op: F,
        retryable: P,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_attempts && retryable(&e) => {
                    tracing::debug!(
                        what,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    clock.sleep(self.delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
