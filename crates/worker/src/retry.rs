//! Exponential-backoff retry policy for job attempts.
//!
//! A failed attempt is retried only when its error is transient and
//! attempts remain. The delay before attempt `n + 1` is
//! `initial_delay * multiplier^(n - 1)`, clamped to `max_delay`.

use std::time::Duration;

use crate::runner::RunError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(120),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay after failed attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        if !delay_ms.is_finite() || delay_ms >= self.max_delay.as_millis() as f64 {
            return self.max_delay;
        }
        Duration::from_millis(delay_ms as u64)
    }

    /// Whether failed attempt `attempt` (1-based) should be retried.
    pub fn retryable(&self, err: &RunError, attempt: u32) -> bool {
        attempt < self.max_attempts && err.is_transient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radiarch_pacs::access::AccessError;
    use radiarch_pipeline::error::PlannerError;

    fn transient() -> RunError {
        PlannerError::Transient(AccessError::HttpStatus(503)).into()
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
    }

    #[test]
    fn backoff_clamps_at_max() {
        let policy = RetryPolicy {
            max_delay: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(policy.backoff(5), Duration::from_secs(10));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn custom_multiplier() {
        let policy = RetryPolicy {
            multiplier: 3.0,
            initial_delay: Duration::from_millis(100),
            ..Default::default()
        };
        assert_eq!(policy.backoff(3), Duration::from_millis(900));
    }

    #[test]
    fn retries_transient_until_exhausted() {
        let policy = RetryPolicy::default();
        assert!(policy.retryable(&transient(), 1));
        assert!(policy.retryable(&transient(), 2));
        assert!(!policy.retryable(&transient(), 3));
    }

    #[test]
    fn never_retries_permanent_errors() {
        let policy = RetryPolicy::default();
        let err: RunError = PlannerError::UnknownWorkflow("x".into()).into();
        assert!(!policy.retryable(&err, 1));
        assert!(!RetryPolicy::none().retryable(&transient(), 1));
    }
}
