use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff schedule for consumer-side redelivery: the n-th retry
/// waits `initial_backoff * multiplier^n`, capped at `backoff_cap`. A message
/// whose retry count reaches `max_retries` is not retried again.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: f64,
    pub backoff_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            backoff_cap: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        // exponent clamp keeps the f64 math finite for garbage retry counts
        let factor = self.backoff_multiplier.powi(retry_count.min(63) as i32);
        let raw_ms = self.initial_backoff.as_millis() as f64 * factor;
        let capped_ms = raw_ms.min(self.backoff_cap.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    pub fn is_exhausted(&self, retry_count: u32) -> bool {
        retry_count >= self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_from_one_second() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..6).map(|n| policy.delay_for(n).as_millis() as u64).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000, 32000]);
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(10), Duration::from_millis(60000));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(60000));
    }

    #[test]
    fn exhaustion_starts_at_max_retries() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
        assert!(policy.is_exhausted(4));
    }

    #[test]
    fn custom_schedule() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff: Duration::from_millis(250),
            backoff_multiplier: 3.0,
            backoff_cap: Duration::from_secs(2),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for(1), Duration::from_millis(750));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
    }
}
