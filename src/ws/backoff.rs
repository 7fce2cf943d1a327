//! Reconnect backoff policy for the live feed.

use std::time::Duration;

/// Exponential reconnect policy.
///
/// Attempt `i` (1-based) waits `base_delay * 2^(i-1)`. After
/// `max_attempts` failed reconnects the client gives up.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnect.
    pub base_delay: Duration,
    /// Number of reconnects scheduled before giving up.
    pub max_attempts: u32,
    /// Upper bound applied after doubling.
    pub max_delay: Duration,
    /// Whether to add up to ±25% jitter to each delay.
    pub jitter: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_attempts: 5,
            max_delay: Duration::from_secs(60),
            jitter: false,
        }
    }
}

impl ReconnectPolicy {
    /// Whether reconnect attempt `attempt` (1-based) may be scheduled.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt >= 1 && attempt <= self.max_attempts
    }

    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(30);
        let base = self.base_delay.as_millis() as f64 * 2f64.powi(exp as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);

        let final_ms = if self.jitter {
            let jitter_range = capped * 0.25;
            let jitter = (rand::random::<f64>() - 0.5) * 2.0 * jitter_range;
            (capped + jitter).max(0.0)
        } else {
            capped
        };

        Duration::from_millis(final_ms as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_per_attempt() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u128> = (1..=5)
            .map(|i| policy.delay_for_attempt(i).as_millis())
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
    }

    #[test]
    fn test_delay_is_monotonic_until_cap() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_millis(250),
            max_attempts: 10,
            max_delay: Duration::from_secs(60),
            jitter: false,
        };
        // 250ms * 2^7 = 32s is the last uncapped delay.
        for i in 1..8 {
            assert!(policy.delay_for_attempt(i + 1) > policy.delay_for_attempt(i));
        }
        assert_eq!(policy.delay_for_attempt(9), policy.max_delay);
        assert_eq!(policy.delay_for_attempt(10), policy.max_delay);
    }

    #[test]
    fn test_delay_caps_at_max() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_millis(1000),
            max_attempts: 20,
            max_delay: Duration::from_millis(5000),
            jitter: false,
        };
        assert_eq!(policy.delay_for_attempt(10).as_millis(), 5000);
    }

    #[test]
    fn test_jitter_stays_within_quarter() {
        let policy = ReconnectPolicy {
            jitter: true,
            ..ReconnectPolicy::default()
        };
        for _ in 0..50 {
            let d = policy.delay_for_attempt(2).as_millis();
            assert!((1500..=2500).contains(&d), "delay out of range: {d}");
        }
    }

    #[test]
    fn test_allows_up_to_max_attempts() {
        let policy = ReconnectPolicy::default();
        assert!(!policy.allows(0));
        assert!(policy.allows(1));
        assert!(policy.allows(5));
        assert!(!policy.allows(6));
    }
}
