//! Retry backoff for contended distributed locks

use std::time::Duration;

/// Configuration for how to back off while a distributed lock is held by someone else
///
/// The wait after the `n`th failed attempt (counting from zero) is
/// `base_delay * multiplier^n`, capped at `max_delay`, before jitter is applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockRetryConfig {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    multiplier: u32,
}

impl Default for LockRetryConfig {
    /// Default retry configuration
    ///
    /// Makes three attempts, waiting 250 ms after the first with a multiplier of 2.
    /// Waits are capped at 900 ms.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_millis(900),
            multiplier: 2,
        }
    }
}

impl LockRetryConfig {
    /// Constructs a new retry configuration
    ///
    /// `max_attempts` is clamped to at least one attempt.
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration, multiplier: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            multiplier,
        }
    }

    /// The total number of acquisition attempts, including the first
    #[inline]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The un-jittered wait following failed attempt number `attempt`
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_delays_double_until_capped() {
        let config = LockRetryConfig::default();
        assert_eq!(config.max_attempts(), 3);
        assert_eq!(config.delay_after(0), Duration::from_millis(250));
        assert_eq!(config.delay_after(1), Duration::from_millis(500));
        assert_eq!(config.delay_after(2), Duration::from_millis(900));
        assert_eq!(config.delay_after(3), Duration::from_millis(900));
    }

    #[test]
    fn enormous_attempt_numbers_do_not_overflow() {
        let config = LockRetryConfig::default();
        assert_eq!(config.delay_after(200), Duration::from_millis(900));
    }

    #[test]
    fn at_least_one_attempt_is_made() {
        let config = LockRetryConfig::new(0, Duration::ZERO, Duration::ZERO, 2);
        assert_eq!(config.max_attempts(), 1);
    }
}
