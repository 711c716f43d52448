//! Poll backoff: decides how long a consumer sleeps between iterations.

use std::time::Duration;

/// Adaptive sleep between consumer iterations.
///
/// After an iteration that returned entries the consumer sleeps `min_delay`,
/// so a backlog drains quickly. Each consecutive empty iteration grows the
/// sleep exponentially up to `max_delay`, so an idle queue is polled rarely.
/// `min_delay == max_delay` gives a fixed interval.
#[derive(Debug, Clone, PartialEq)]
pub struct PollBackoff {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl PollBackoff {
    pub fn new(min_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            min_delay,
            max_delay: max_delay.max(min_delay),
            multiplier: multiplier.max(1.0),
        }
    }

    pub fn fixed(delay: Duration) -> Self {
        Self::new(delay, delay, 1.0)
    }

    /// Delay after `empty_streak` consecutive empty iterations.
    ///
    /// delay = min_delay * multiplier^(empty_streak - 1), capped at max_delay;
    /// a streak of 0 (the last batch had work) gives min_delay.
    ///
    /// Example with min=250ms, max=4s, multiplier=2.0:
    /// - streak 0: 250ms
    /// - streak 1: 250ms
    /// - streak 2: 500ms
    /// - streak 3: 1s
    /// - streak 6: 4s (capped)
    pub fn next_delay(&self, empty_streak: u32) -> Duration {
        let exponent = empty_streak.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.min_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }
}

impl Default for PollBackoff {
    /// One second, fixed.
    fn default() -> Self {
        Self::fixed(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn default_is_fixed_one_second() {
        let backoff = PollBackoff::default();
        assert_eq!(backoff.next_delay(0), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(10), Duration::from_secs(1));
    }

    #[rstest]
    #[case(0, Duration::from_millis(250))]
    #[case(1, Duration::from_millis(250))]
    #[case(2, Duration::from_millis(500))]
    #[case(3, Duration::from_secs(1))]
    #[case(5, Duration::from_secs(4))]
    #[case(6, Duration::from_secs(4))]
    #[case(u32::MAX, Duration::from_secs(4))]
    fn exponential_backoff_is_capped(#[case] streak: u32, #[case] expected: Duration) {
        let backoff = PollBackoff::new(Duration::from_millis(250), Duration::from_secs(4), 2.0);
        assert_eq!(backoff.next_delay(streak), expected);
    }

    #[test]
    fn constructor_normalises_inputs() {
        let backoff = PollBackoff::new(Duration::from_secs(2), Duration::from_secs(1), 0.5);
        assert_eq!(backoff.max_delay, Duration::from_secs(2));
        assert_eq!(backoff.multiplier, 1.0);
    }
}
