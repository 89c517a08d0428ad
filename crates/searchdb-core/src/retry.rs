//! Busy-retry with exponential backoff and jitter.
//!
//! SQLite reports lock contention as `SQLITE_BUSY`/`SQLITE_LOCKED`. Those are
//! retried here instead of being surfaced to callers:
//! - Exponential backoff (delay doubles each attempt), capped at `max_delay`
//! - Optional jitter so competing handles don't wake in lockstep
//! - Unlimited attempts unless `max_attempts` is set

use crate::error::is_busy_error;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for busy-retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first one). `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Initial delay between retries.
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Exponential base (typically 2.0 for doubling).
    pub exponential_base: f64,
    /// Whether to add random jitter to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            base_delay: Duration::from_micros(100),
            max_delay: Duration::from_millis(50),
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up after `attempts` busy results (at least one attempt is made).
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts.max(1));
        self
    }

    /// Sleep before the first retry.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Longest sleep between two attempts.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        // Clamp the exponent; the cap is reached long before this anyway
        let exponent = attempt.min(32) as i32;
        let multiplier = self.exponential_base.powi(exponent);
        let delay_secs = self.base_delay.as_secs_f64() * multiplier;
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());

        let final_secs = if self.jitter {
            let mut rng = rand::rng();
            let jitter_factor = rng.random_range(0.5..1.5);
            (capped_secs * jitter_factor).min(self.max_delay.as_secs_f64())
        } else {
            capped_secs
        };

        Duration::from_secs_f64(final_secs)
    }

    fn attempts_exhausted(&self, attempts_made: u32) -> bool {
        self.max_attempts
            .is_some_and(|max_attempts| attempts_made >= max_attempts)
    }
}

/// Run a SQLite operation, retrying while it reports busy or locked.
///
/// Any other error is returned immediately. The operation is re-run from the
/// start on each attempt, so it must not leave partial state behind when it
/// fails with busy.
pub fn retry_busy<T, F>(config: &RetryConfig, what: &str, mut operation: F) -> rusqlite::Result<T>
where
    F: FnMut() -> rusqlite::Result<T>,
{
    let mut attempt: u32 = 0;

    loop {
        match operation() {
            Ok(value) => {
                if attempt > 0 {
                    debug!("{} succeeded after {} busy retries", what, attempt);
                }
                return Ok(value);
            }
            Err(e) if is_busy_error(&e) => {
                if config.attempts_exhausted(attempt + 1) {
                    warn!(
                        "{} still busy after {} attempts, giving up: {}",
                        what,
                        attempt + 1,
                        e
                    );
                    return Err(e);
                }

                let delay = config.calculate_delay(attempt);
                if attempt == 0 {
                    debug!("{} reported busy, retrying in {:?}", what, delay);
                } else if attempt % 100 == 0 {
                    warn!("{} busy for {} attempts, still retrying", what, attempt);
                }

                std::thread::sleep(delay);
                attempt = attempt.saturating_add(1);
            }
            Err(e) => return Err(e),
        }
    }
}
