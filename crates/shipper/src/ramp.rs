//! Upload concurrency controller.
//!
//! Concurrency starts at the maximum. A cycle that only failed halves it;
//! a cycle that only succeeded raises it by one. Mixed or idle cycles leave
//! it alone.

/// Additive-increase, multiplicative-decrease limit on in-flight uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampController {
    max: usize,
    current: usize,
}

impl RampController {
    /// Start at `max` (at least 1).
    pub fn new(max: usize) -> Self {
        let max = max.max(1);
        RampController { max, current: max }
    }

    /// Uploads allowed in the next cycle.
    pub fn current(&self) -> usize {
        self.current
    }

    /// Upper bound.
    pub fn max(&self) -> usize {
        self.max
    }

    /// Feed one cycle's results; returns the new limit.
    pub fn record(&mut self, succeeded: usize, failed: usize) -> usize {
        if failed > 0 && succeeded == 0 {
            self.current = (self.current / 2).max(1);
        } else if succeeded > 0 && failed == 0 {
            self.current = (self.current + 1).min(self.max);
        }
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halves_on_failure_and_recovers() {
        let mut ramp = RampController::new(8);
        assert_eq!(ramp.current(), 8);
        assert_eq!(ramp.record(0, 3), 4);
        assert_eq!(ramp.record(0, 1), 2);
        assert_eq!(ramp.record(0, 1), 1);
        assert_eq!(ramp.record(0, 1), 1);
        assert_eq!(ramp.record(2, 0), 2);
        assert_eq!(ramp.record(5, 1), 2);
        assert_eq!(ramp.record(0, 0), 2);
        for _ in 0..20 {
            ramp.record(1, 0);
        }
        assert_eq!(ramp.current(), 8);
    }

    #[test]
    fn test_zero_max_is_one() {
        let ramp = RampController::new(0);
        assert_eq!(ramp.max(), 1);
        assert_eq!(ramp.current(), 1);
    }
}
