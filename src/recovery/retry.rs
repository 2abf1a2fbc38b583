//! Retry policies with exponential backoff

use std::collections::HashSet;
use std::time::Duration;

use crate::error::ErrorKind;

/// Controls how many times an operation is attempted and how long to wait
/// between attempts
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Kinds that are retried; anything else goes straight to fallbacks
    pub retryable: HashSet<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            backoff_multiplier: 2.0,
            retryable: [
                ErrorKind::Connection,
                ErrorKind::Timeout,
                ErrorKind::FileSystem,
                ErrorKind::Network,
                ErrorKind::Creation,
                ErrorKind::Registry,
            ]
            .into_iter()
            .collect(),
        }
    }
}

impl RetryPolicy {
    /// Default policy with a different attempt count and base delay
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Self::default()
        }
    }

    /// A policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            retryable: HashSet::new(),
            ..Self::default()
        }
    }

    /// Replace the retryable set
    pub fn with_retryable(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retryable = kinds.into_iter().collect();
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn should_retry(&self, kind: ErrorKind) -> bool {
        self.retryable.contains(&kind)
    }

    /// Delay to wait after the given (1-based) failed attempt:
    /// `min(base * multiplier^(attempt-1), max)`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.base_delay.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.retryable.len(), 6);
        assert!(policy.should_retry(ErrorKind::Connection));
        assert!(!policy.should_retry(ErrorKind::DiskSpace));
        assert!(!policy.should_retry(ErrorKind::Compression));
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(30_000));
    }

    #[test]
    fn test_custom_policy() {
        let policy = RetryPolicy::new(5, Duration::from_millis(5000))
            .with_retryable([ErrorKind::Timeout])
            .with_max_delay(Duration::from_millis(8000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(8000));
        assert!(policy.should_retry(ErrorKind::Timeout));
        assert!(!policy.should_retry(ErrorKind::Connection));
    }
}
