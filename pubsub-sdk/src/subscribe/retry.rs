use std::time::Duration;

/// Exponential back-off for the subscribe loop.
///
/// The delay for attempt `n` (zero-based) is `base_delay * 2^n`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// A policy retrying forever between `base_delay` and `max_delay`.
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts: None,
        }
    }

    /// Give up after `attempts` consecutive failures.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Smallest delay.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Largest delay.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Whether another attempt is allowed after `failures` consecutive failures.
    pub fn allows(&self, failures: u32) -> bool {
        self.max_attempts.is_none_or(|max| failures < max)
    }

    /// Delay before retry number `attempt`, never shorter than `hint` (e.g. a `Retry-After`).
    pub fn delay_for_attempt(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let multiplier = 1_u32 << attempt.min(20);
        let calculated = self.base_delay.saturating_mul(multiplier);
        calculated
            .max(hint.unwrap_or_default())
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_base_delay() {
        let policy = RetryPolicy::new(Duration::from_millis(250), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(0, None), Duration::from_millis(250));
    }

    #[test]
    fn doubles_and_caps() {
        let policy = RetryPolicy::new(Duration::from_millis(100), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(3, None), Duration::from_millis(800));
        assert_eq!(policy.delay_for_attempt(40, None), Duration::from_secs(10));
    }

    #[test]
    fn honors_larger_hint() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay_for_attempt(1, Some(Duration::from_secs(10))),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn limits_attempts_when_asked() {
        let policy = RetryPolicy::default();
        assert!(policy.allows(1_000));

        let policy = policy.with_max_attempts(2);
        assert!(policy.allows(1));
        assert!(!policy.allows(2));
    }
}
