//! Retry policy for tag attempts.
//!
//! A pure counting wrapper: given how many attempts a tag has used, decide
//! whether another one may run, and supply the delay inserted between
//! attempts. It never catches errors itself — the state machine consults
//! it after observing a failed attempt.

use spooltag_core::config::EngineConfig;
use std::time::Duration;

/// Bounded re-attempt policy.
///
/// # Examples
///
/// ```
/// use spooltag_engine::retry::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(3, Duration::from_millis(500));
/// assert!(policy.should_retry(2));
/// assert!(!policy.should_retry(3));
/// assert_eq!(policy.remaining(1), 2);
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    retry_limit: u32,
    inter_attempt_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy allowing `retry_limit` attempts per tag.
    pub fn new(retry_limit: u32, inter_attempt_delay: Duration) -> Self {
        Self {
            retry_limit,
            inter_attempt_delay,
        }
    }

    /// Build a policy from engine configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.retry_limit, config.inter_attempt_delay())
    }

    /// Total attempts allowed per tag.
    #[must_use]
    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    /// Whether another attempt may run after `attempts_used` attempts.
    #[must_use]
    pub fn should_retry(&self, attempts_used: u32) -> bool {
        attempts_used < self.retry_limit
    }

    /// Attempts remaining after `attempts_used` attempts.
    #[must_use]
    pub fn remaining(&self, attempts_used: u32) -> u32 {
        self.retry_limit.saturating_sub(attempts_used)
    }

    /// Delay to insert before the next attempt.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.inter_attempt_delay
    }
}
