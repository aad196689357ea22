use std::time::Duration;

use courier_core::{AppError, AppResult};

use crate::webhook_delivery_service::DeliveryReport;

/// Default ceiling of delivery invocations per attempt.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// What the scheduler should do after one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not invoke again.
    Stop,
    /// Invoke again once the delay has elapsed.
    RetryAfter(Duration),
}

/// Exponential backoff with a max-attempt ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Creates a validated retry policy.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> AppResult<Self> {
        if max_attempts == 0 {
            return Err(AppError::Validation(
                "max_attempts must be greater than zero".to_owned(),
            ));
        }

        if base_delay.is_zero() {
            return Err(AppError::Validation(
                "base_delay must be greater than zero".to_owned(),
            ));
        }

        if max_delay < base_delay {
            return Err(AppError::Validation(
                "max_delay must not be shorter than base_delay".to_owned(),
            ));
        }

        Ok(Self {
            max_attempts,
            base_delay,
            max_delay,
        })
    }

    /// Returns the attempt ceiling.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay before the invocation following `attempt_count`.
    ///
    /// `base * 2^(attempt_count - 1)`, capped at the max delay.
    #[must_use]
    pub fn backoff_delay(&self, attempt_count: u32) -> Duration {
        let exponent = attempt_count.saturating_sub(1);
        2_u32
            .checked_pow(exponent)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Decides whether the scheduler should invoke the attempt again.
    #[must_use]
    pub fn decide(&self, report: &DeliveryReport) -> RetryDecision {
        if report.outcome.is_terminal() || report.attempt_count >= self.max_attempts {
            return RetryDecision::Stop;
        }

        RetryDecision::RetryAfter(self.backoff_delay(report.attempt_count))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(600),
        }
    }
}
