//! Bounded exponential backoff for device operations.

use std::fmt;
use std::time::Duration;

use flint_config::DeviceConfig;
use tracing::{debug, warn};

/// How often and how patiently a failed operation is retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap for the exponential growth.
    pub max_delay: Duration,
    /// Factor applied to the delay after each retry.
    pub backoff_multiplier: f64,
}

/// Every attempt of an operation failed.
#[derive(Debug)]
pub struct Exhausted<E> {
    /// Attempts made, including the first.
    pub attempts: u32,
    /// The error of the last attempt.
    pub last: E,
}

impl RetryPolicy {
    /// Creates a policy with the default delays.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }

    /// Builds the policy from `[device]` settings.
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self::new(config.max_retries)
            .with_initial_delay(Duration::from_millis(config.backoff_initial_ms))
            .with_max_delay(Duration::from_millis(config.backoff_max_ms))
    }

    /// Set initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Total attempts allowed.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `attempt + 1`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Runs `operation` until it succeeds, fails with an error `should_retry`
    /// rejects, or runs out of attempts. Sleeps between attempts.
    ///
    /// On success returns the value and the number of retries used.
    pub fn run<T, E: fmt::Display>(
        &self,
        label: &dyn fmt::Display,
        mut operation: impl FnMut() -> Result<T, E>,
        should_retry: impl Fn(&E) -> bool,
    ) -> Result<(T, u32), Exhausted<E>> {
        let mut attempt = 0;
        loop {
            match operation() {
                Ok(value) => {
                    if attempt > 0 {
                        debug!("{} succeeded after {} retries", label, attempt);
                    }
                    return Ok((value, attempt));
                }
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts() || !should_retry(&err) {
                        return Err(Exhausted {
                            attempts: attempt,
                            last: err,
                        });
                    }
                    let delay = self.delay_for_attempt(attempt - 1);
                    warn!(
                        "{} attempt {} failed: {}. Retrying in {:?}...",
                        label, attempt, err, delay
                    );
                    std::thread::sleep(delay);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}
