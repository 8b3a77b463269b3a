//! Exponential backoff bookkeeping for channel reconnects.

use std::time::Duration;

/// Outcome of recording one failed open attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule another attempt after `delay_ms`.
    Retry { attempt: u32, delay_ms: u64 },
    /// No retries remain; `attempts` opens were made in total.
    Exhausted { attempts: u32 },
}

/// Retry budget and exponential delay schedule.
///
/// `max_retries` counts retries, not attempts: a policy with three retries
/// allows four opens in total before giving up.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub backoff_factor: f64,
    current_attempt: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay_ms: u64, backoff_factor: f64) -> Self {
        Self {
            max_retries,
            initial_delay_ms,
            backoff_factor,
            current_attempt: 0,
        }
    }

    /// Number of consecutive failures recorded since the last reset.
    pub fn current_attempt(&self) -> u32 {
        self.current_attempt
    }

    /// 1-indexed number of the next open attempt.
    pub fn next_attempt(&self) -> u32 {
        self.current_attempt.saturating_add(1)
    }

    /// Delay before retry `attempt` (1-indexed): `initial * factor^(attempt-1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.delay_ms_for(attempt))
    }

    /// [`Self::delay_for`] in whole milliseconds, saturating at `u64::MAX`.
    pub fn delay_ms_for(&self, attempt: u32) -> u64 {
        let exponent = attempt.max(1) - 1;
        let exponent = i32::try_from(exponent).unwrap_or(i32::MAX);
        let millis = self.initial_delay_ms as f64 * self.backoff_factor.powi(exponent);
        if !millis.is_finite() || millis >= u64::MAX as f64 {
            u64::MAX
        } else {
            millis.round() as u64
        }
    }

    /// Count a failed open and decide whether to retry.
    pub fn record_failure(&mut self) -> RetryDecision {
        self.current_attempt = self.current_attempt.saturating_add(1);
        if self.current_attempt <= self.max_retries {
            RetryDecision::Retry {
                attempt: self.current_attempt,
                delay_ms: self.delay_ms_for(self.current_attempt),
            }
        } else {
            RetryDecision::Exhausted {
                attempts: self.current_attempt,
            }
        }
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }
}
