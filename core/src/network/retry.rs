//! Retry policy for operations that must eventually succeed
//!
//! The policy only answers "how long until the next attempt, if any";
//! the caller owns the loop. That keeps the schedule testable without a
//! timer and lets boards swap a bounded policy in for the default
//! retry-forever one.

use embassy_time::Duration;

/// How the delay grows between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Backoff {
    /// Same interval after every failure
    Fixed,
    /// Interval doubles after every failure, capped at `max`
    Exponential { max: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RetryPolicy {
    /// Total attempts allowed, `None` for no limit
    pub max_attempts: Option<u32>,
    /// Delay after the first failure
    pub interval: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Retry without limit at a fixed interval
    pub const fn forever(interval: Duration) -> Self {
        Self {
            max_attempts: None,
            interval,
            backoff: Backoff::Fixed,
        }
    }

    /// At most `max_attempts` attempts at a fixed interval
    pub const fn bounded(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            interval,
            backoff: Backoff::Fixed,
        }
    }

    pub const fn with_exponential_backoff(mut self, max: Duration) -> Self {
        self.backoff = Backoff::Exponential { max };
        self
    }

    /// Delay before the attempt following failed attempt number `attempt`
    /// (1-based), or `None` when the policy gives up
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if let Some(max_attempts) = self.max_attempts {
            if attempt >= max_attempts {
                return None;
            }
        }

        let delay = match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential { max } => {
                let factor = 1u64
                    .checked_shl(attempt.saturating_sub(1))
                    .unwrap_or(u64::MAX);
                let ticks = self.interval.as_ticks().saturating_mul(factor);
                Duration::from_ticks(ticks).min(max)
            }
        };
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forever_never_gives_up() {
        let policy = RetryPolicy::forever(Duration::from_secs(10));
        assert_eq!(policy.next_delay(1), Some(Duration::from_secs(10)));
        assert_eq!(policy.next_delay(10_000), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_bounded_gives_up_after_last_attempt() {
        let policy = RetryPolicy::bounded(3, Duration::from_millis(100));
        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(3), None);
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = RetryPolicy::forever(Duration::from_secs(1))
            .with_exponential_backoff(Duration::from_secs(5));
        assert_eq!(policy.next_delay(1), Some(Duration::from_secs(1)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_secs(2)));
        assert_eq!(policy.next_delay(3), Some(Duration::from_secs(4)));
        assert_eq!(policy.next_delay(4), Some(Duration::from_secs(5)));
        assert_eq!(policy.next_delay(200), Some(Duration::from_secs(5)));
    }
}
