//! # Backoff Policy Module
//!
//! Exponential backoff for webhook delivery attempts.
//!
//! Attempts are numbered from 1. After attempt `n` fails and attempts remain,
//! the engine waits `initial_delay * backoff_multiplier^(n-1)`, capped at
//! `max_delay`. There is no jitter: each subscription runs its own loop, so
//! retries from different subscribers are already spread by their own timing.

use std::time::Duration;

/// Backoff policy for webhook delivery attempts
///
/// # Examples
///
/// ```rust
/// use settlehook_core::retry::BackoffPolicy;
/// use std::time::Duration;
///
/// // Default policy: 3 attempts, 2s initial, 60s max, 2.0x multiplier
/// let policy = BackoffPolicy::default();
/// assert_eq!(policy.delay_after_attempt(1), Duration::from_secs(2));
/// assert_eq!(policy.delay_after_attempt(2), Duration::from_secs(4));
///
/// // Custom policy
/// let policy = BackoffPolicy::new(3, Duration::from_millis(1000));
/// assert_eq!(policy.delay_after_attempt(2), Duration::from_millis(2000));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Total number of delivery attempts, including the first one
    pub max_attempts: u32,

    /// Delay after the first failed attempt
    pub initial_delay: Duration,

    /// Maximum delay between attempts
    pub max_delay: Duration,

    /// Exponential backoff multiplier (typically 2.0)
    pub backoff_multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Create a doubling policy with the given attempt count and base delay
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Total attempts per notification (values below 1 are raised to 1)
    /// * `initial_delay` - Wait after the first failed attempt
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            ..Self::default()
        }
    }

    /// Override the delay cap
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Override the growth factor (values below 1.0 are raised to 1.0)
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self
    }

    /// Delay to wait after attempt number `attempt` (1-based) has failed
    ///
    /// # Examples
    ///
    /// ```rust
    /// use settlehook_core::retry::BackoffPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = BackoffPolicy::new(5, Duration::from_millis(500));
    /// assert_eq!(policy.delay_after_attempt(1), Duration::from_millis(500));
    /// assert_eq!(policy.delay_after_attempt(3), Duration::from_millis(2000));
    /// ```
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_delay_secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        // Cap at max_delay; powi can overflow to infinity for large exponents
        let capped_delay_secs = if base_delay_secs.is_finite() {
            base_delay_secs.min(self.max_delay.as_secs_f64())
        } else {
            self.max_delay.as_secs_f64()
        };

        Duration::from_secs_f64(capped_delay_secs)
    }

    /// Check whether another attempt is allowed after `attempts_made` attempts
    pub fn has_attempts_remaining(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Sum of all backoff waits for a notification that never succeeds
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts)
            .map(|attempt| self.delay_after_attempt(attempt))
            .sum()
    }

    /// Upper bound on wall-clock time for one notification to one subscriber
    ///
    /// There is no deadline across the loop; this is the sum of every backoff
    /// wait plus `max_attempts` full attempt timeouts.
    pub fn worst_case_duration(&self, attempt_timeout: Duration) -> Duration {
        self.total_backoff() + attempt_timeout * self.max_attempts
    }
}

/// State tracker for the attempt loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    /// Current attempt number (1-based)
    pub attempt: u32,
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryState {
    /// Create new retry state positioned on the first attempt
    pub fn new() -> Self {
        Self { attempt: 1 }
    }

    /// Advance to the next attempt
    pub fn next_attempt(&mut self) {
        self.attempt += 1;
    }

    /// Check if this is the first attempt
    pub fn is_first_attempt(&self) -> bool {
        self.attempt == 1
    }

    /// Delay to wait before the next attempt
    pub fn get_delay(&self, policy: &BackoffPolicy) -> Duration {
        policy.delay_after_attempt(self.attempt)
    }

    /// Check if the policy allows another attempt after the current one
    pub fn can_retry(&self, policy: &BackoffPolicy) -> bool {
        policy.has_attempts_remaining(self.attempt)
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
