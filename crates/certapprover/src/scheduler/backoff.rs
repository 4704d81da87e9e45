//! Exponential retry backoff

use crate::config::BackoffConfig;
use rand::Rng;
use std::time::Duration;

impl BackoffConfig {
    /// Delay before retry number `attempt` (0 for the first retry).
    ///
    /// Grows by `multiplier` per attempt and is capped at `max_delay_ms`;
    /// jitter adds up to 10% on top of the capped delay.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(63) as i32;
        let base = self.initial_delay_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        let capped = base.min(self.max_delay_ms as f64);

        let delay = if self.jitter && capped > 0.0 {
            capped + rand::thread_rng().gen_range(0.0..=capped * 0.1)
        } else {
            capped
        };

        Duration::from_millis(delay as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff(jitter: bool) -> BackoffConfig {
        BackoffConfig {
            initial_delay_ms: 100,
            max_delay_ms: 1_000,
            multiplier: 2.0,
            jitter,
        }
    }

    #[test]
    fn test_delay_grows_exponentially() {
        let backoff = backoff(false);
        assert_eq!(backoff.delay_for(0), Duration::from_millis(100));
        assert_eq!(backoff.delay_for(1), Duration::from_millis(200));
        assert_eq!(backoff.delay_for(3), Duration::from_millis(800));
    }

    #[test]
    fn test_delay_is_capped() {
        let backoff = backoff(false);
        assert_eq!(backoff.delay_for(4), Duration::from_millis(1_000));
        assert_eq!(backoff.delay_for(u32::MAX), Duration::from_millis(1_000));
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let plain_backoff = backoff(false);
        let jittered_backoff = backoff(true);
        for attempt in 0..8 {
            let plain = plain_backoff.delay_for(attempt);
            let jittered = jittered_backoff.delay_for(attempt);
            assert!(jittered >= plain);
            assert!(jittered.as_millis() <= plain.as_millis() + plain.as_millis() / 10 + 1);
        }
    }
}
