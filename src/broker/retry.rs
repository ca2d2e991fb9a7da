//! Retry with exponential backoff for transient broker failures

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{config_error, BrokerError, EvoResult};

/// How often and how patiently a broker operation is retried
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Pause before the first retry
    pub initial_backoff_ms: u64,
    /// Upper bound on any single pause
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 10,
            max_backoff_ms: 200,
        }
    }
}

/// Result of a retried operation together with the attempts it took
#[derive(Debug)]
pub struct Attempted<T> {
    /// Final result
    pub result: Result<T, BrokerError>,
    /// Attempts made (at least 1)
    pub attempts: u32,
}

impl RetryPolicy {
    /// A single attempt, no retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Check the attempt count and backoff bounds
    pub fn validate(&self) -> EvoResult<()> {
        if self.max_attempts == 0 {
            return Err(config_error("retry max_attempts must be at least 1"));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(config_error(format!(
                "retry initial backoff ({} ms) exceeds max backoff ({} ms)",
                self.initial_backoff_ms, self.max_backoff_ms
            )));
        }
        Ok(())
    }

    /// Pause after the given failed attempt (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(20);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }

    /// Longest total pause a single [`run`](Self::run) can add
    pub fn max_delay(&self) -> Duration {
        (1..self.max_attempts.max(1)).map(|attempt| self.backoff(attempt)).sum()
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    pub fn run<T, F>(&self, mut op: F) -> Attempted<T>
    where
        F: FnMut() -> Result<T, BrokerError>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempts = 0;
        loop {
            attempts += 1;
            match op() {
                Err(err) if err.is_transient() && attempts < max_attempts => {
                    std::thread::sleep(self.backoff(attempts));
                }
                result => return Attempted { result, attempts },
            }
        }
    }
}
