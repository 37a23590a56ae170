//! Capped exponential retry delay.

use std::time::Duration;

/// `delay(n) = min(cap, base · 2^(n-1))` for the n-th failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay after the first failure
    pub base: Duration,
    /// Upper bound on any delay
    pub cap: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff {
            base: Duration::from_secs(30),
            cap: Duration::from_secs(2 * 3600),
        }
    }
}

impl Backoff {
    /// Backoff with the given base and cap.
    pub fn new(base: Duration, cap: Duration) -> Self {
        Backoff { base, cap }
    }

    /// Delay before retrying after `attempt` failures (1-based).
    ///
    /// Attempt 0 has no delay. Non-decreasing in `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exp = (attempt - 1).min(63);
        let factor = 1u64 << exp;
        let nanos = self.base.as_nanos().saturating_mul(u128::from(factor));
        let capped = nanos.min(self.cap.as_nanos());
        Duration::from_nanos(u64::try_from(capped).unwrap_or(u64::MAX))
    }

    /// [`delay`](Self::delay) as a `chrono` duration for state records.
    pub fn chrono_delay(&self, attempt: u32) -> chrono::Duration {
        chrono::Duration::from_std(self.delay(attempt))
            .unwrap_or_else(|_| chrono::Duration::days(365 * 1000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_doubles_until_cap() {
        let b = Backoff::new(Duration::from_secs(30), Duration::from_secs(200));
        assert_eq!(b.delay(0), Duration::ZERO);
        assert_eq!(b.delay(1), Duration::from_secs(30));
        assert_eq!(b.delay(2), Duration::from_secs(60));
        assert_eq!(b.delay(3), Duration::from_secs(120));
        assert_eq!(b.delay(4), Duration::from_secs(200));
        assert_eq!(b.delay(1000), Duration::from_secs(200));
    }

    #[test]
    fn test_default_reaches_two_hours() {
        let b = Backoff::default();
        assert_eq!(b.delay(u32::MAX), Duration::from_secs(7200));
        assert_eq!(b.chrono_delay(1), chrono::Duration::seconds(30));
    }

    proptest! {
        #[test]
        fn prop_delays_are_monotonic_and_capped(
            base_ms in 1u64..100_000,
            cap_factor in 1u64..1000,
            attempt in 1u32..200,
        ) {
            let base = Duration::from_millis(base_ms);
            let cap = Duration::from_millis(base_ms * cap_factor);
            let b = Backoff::new(base, cap);
            prop_assert!(b.delay(attempt) <= b.delay(attempt + 1));
            prop_assert!(b.delay(attempt) <= cap);
            prop_assert!(b.delay(attempt) >= base.min(cap));
        }
    }
}
