use crate::shared::config::SyncConfig;
use rand::Rng;
use std::time::Duration;

/// 指数バックオフ（full jitter）と試行回数上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.base_delay(), config.max_delay(), config.max_attempts)
    }

    pub fn media_from_config(config: &SyncConfig) -> Self {
        Self::new(
            config.base_delay(),
            config.max_delay(),
            config.media_max_attempts,
        )
    }

    /// attempt 回目の失敗後の遅延上限（base * 2^(attempt-1)、cap で打ち切り）
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let base_ms = self.base_delay.as_millis() as u64;
        let delay_ms = base_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay_ms).min(self.max_delay)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ceiling_ms = self.ceiling(attempt).as_millis() as u64;
        if ceiling_ms == 0 {
            return Duration::ZERO;
        }
        let jittered = rand::thread_rng().gen_range(0..=ceiling_ms);
        Duration::from_millis(jittered)
    }

    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30), 5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_doubles_until_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.ceiling(1), Duration::from_secs(1));
        assert_eq!(policy.ceiling(2), Duration::from_secs(2));
        assert_eq!(policy.ceiling(5), Duration::from_secs(16));
        assert_eq!(policy.ceiling(6), Duration::from_secs(30));
        assert_eq!(policy.ceiling(40), Duration::from_secs(30));
    }

    #[test]
    fn jittered_delay_stays_within_ceiling() {
        let policy = RetryPolicy::default();
        for attempt in 1..10 {
            let delay = policy.delay_for(attempt);
            assert!(delay <= policy.ceiling(attempt));
        }
    }

    #[test]
    fn zero_base_never_waits() {
        let policy = RetryPolicy::new(Duration::ZERO, Duration::ZERO, 3);
        assert_eq!(policy.delay_for(3), Duration::ZERO);
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
    }
}
