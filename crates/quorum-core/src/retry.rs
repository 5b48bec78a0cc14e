//! Retry and backoff configuration.
//!
//! Two retry policies coexist in this system and must not be conflated:
//! exchange calls use a fixed delay between attempts, recommendation-source
//! calls double their delay each attempt. Making the backoff an explicit
//! value keeps both visible and testable instead of duplicating inline
//! retry loops at every call site.

use std::time::Duration;

/// Delay strategy between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every attempt.
    Fixed(Duration),
    /// Delay doubles after each attempt, starting at `initial`.
    Exponential { initial: Duration },
}

/// Retry budget plus backoff strategy for a retrying call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    /// Create a policy with a fixed inter-attempt delay.
    #[must_use]
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Fixed(delay),
        }
    }

    /// Create a policy whose delay doubles each attempt.
    #[must_use]
    pub fn exponential(max_attempts: u32, initial: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Exponential { initial },
        }
    }

    /// Default policy for exchange calls: 3 attempts, fixed 2 s delay.
    #[must_use]
    pub fn exchange_default() -> Self {
        Self::fixed(3, Duration::from_secs(2))
    }

    /// Default policy for recommendation-source calls: 3 attempts,
    /// exponentially doubling delay starting at 2 s.
    #[must_use]
    pub fn source_default() -> Self {
        Self::exponential(3, Duration::from_secs(2))
    }

    /// Maximum number of attempts (always at least 1).
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after the given 1-based attempt fails.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial } => {
                let shift = attempt.saturating_sub(1).min(31);
                initial.saturating_mul(1u32 << shift)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay_constant() {
        let policy = RetryPolicy::exchange_default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(2));
    }

    #[test]
    fn test_exponential_delay_doubles() {
        let policy = RetryPolicy::source_default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3), Duration::from_secs(8));
    }

    #[test]
    fn test_at_least_one_attempt() {
        let policy = RetryPolicy::fixed(0, Duration::from_millis(1));
        assert_eq!(policy.max_attempts(), 1);
    }
}
