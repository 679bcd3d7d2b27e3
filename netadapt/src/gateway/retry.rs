//! Retry policy for gateway operations.
//!
//! The gateway derives one [`RetryPolicy`] per call from the active
//! [`TierProfile`](crate::tier::TierProfile): `retry_attempts + 1` total
//! attempts with exponential backoff between them.
//!
//! With the default [`BackoffConfig`] the wait after the n-th failed attempt
//! is `2^(n-1)` seconds (1 s, 2 s, 4 s, ...) capped at 30 s.

use std::time::Duration;

/// Default initial delay for exponential backoff (1 second).
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1_000;

/// Default maximum delay for exponential backoff (30 seconds).
pub const DEFAULT_MAX_DELAY_SECS: u64 = 30;

/// Default multiplier for exponential backoff.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Backoff shape shared by every tier.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

/// How an operation handles transient failures.
#[derive(Clone, Debug, PartialEq)]
pub enum RetryPolicy {
    /// No retries - fail immediately on error.
    None,

    /// Exponential backoff with configurable parameters.
    ExponentialBackoff {
        /// Maximum number of attempts (including the initial attempt).
        max_attempts: u32,
        /// Delay after the first failure.
        initial_delay: Duration,
        /// Maximum delay cap (delay won't exceed this).
        max_delay: Duration,
        /// Multiplier applied to delay after each failure.
        multiplier: f64,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::None
    }
}

impl RetryPolicy {
    /// Policy allowing `retries` retries after the first attempt.
    pub fn from_retries(retries: u32, backoff: &BackoffConfig) -> Self {
        if retries == 0 {
            return Self::None;
        }
        Self::ExponentialBackoff {
            max_attempts: retries.saturating_add(1),
            initial_delay: backoff.initial_delay,
            max_delay: backoff.max_delay,
            multiplier: backoff.multiplier,
        }
    }

    /// Delay to wait after the given failed attempt.
    ///
    /// `attempt` is 1-based. Returns `None` once no attempts remain.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::ExponentialBackoff {
                max_attempts,
                initial_delay,
                max_delay,
                multiplier,
            } => {
                if attempt >= *max_attempts {
                    return None;
                }
                let factor = multiplier.powi(attempt.saturating_sub(1) as i32);
                let delay_ms = (initial_delay.as_millis() as f64 * factor)
                    .min(max_delay.as_millis() as f64);
                Some(Duration::from_millis(delay_ms as u64).min(*max_delay))
            }
        }
    }

    /// Returns the maximum number of attempts for this policy.
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::ExponentialBackoff { max_attempts, .. } => *max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_retries_is_none() {
        let policy = RetryPolicy::from_retries(0, &BackoffConfig::default());
        assert_eq!(policy, RetryPolicy::None);
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.delay_for_attempt(1), None);
    }

    #[test]
    fn test_default_backoff_doubles_in_seconds() {
        let policy = RetryPolicy::from_retries(3, &BackoffConfig::default());
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_for_attempt(3), Some(Duration::from_secs(4)));
        assert_eq!(policy.delay_for_attempt(4), None);
    }

    #[test]
    fn test_backoff_respects_max_delay() {
        let policy = RetryPolicy::from_retries(10, &BackoffConfig::default());
        assert_eq!(policy.delay_for_attempt(9), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_custom_backoff() {
        let backoff = BackoffConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(25),
            multiplier: 3.0,
        };
        let policy = RetryPolicy::from_retries(5, &backoff);
        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(10)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(25)));
    }
}
