// Active-time threshold tracking for the open document.
//
// The clock only reports that a target was reached; whoever polls it picks
// the next target. Targets must strictly increase for one document.

use std::time::Duration;

use tracing::debug;

/// Accumulated active time and the next firing target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveTimeThreshold {
    pub accumulated: Duration,
    pub next_target: Duration,
}

#[derive(Debug, Clone)]
pub struct ActiveTimeClock {
    interval: Duration,
    next_target: Duration,
}

impl ActiveTimeClock {
    /// First target is one interval after `elapsed`.
    pub fn new(interval: Duration, elapsed: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        Self { interval, next_target: elapsed + interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next_target(&self) -> Duration {
        self.next_target
    }

    pub fn threshold(&self, elapsed: Duration) -> ActiveTimeThreshold {
        ActiveTimeThreshold { accumulated: elapsed, next_target: self.next_target }
    }

    /// Time left until the target, zero if already reached.
    pub fn remaining(&self, elapsed: Duration) -> Duration {
        self.next_target.saturating_sub(elapsed)
    }

    /// Returns the reached target if `elapsed` has got there. The target does
    /// not move until the caller sets a new one.
    pub fn poll(&self, elapsed: Duration) -> Option<Duration> {
        (elapsed >= self.next_target).then_some(self.next_target)
    }

    /// Move the target forward. A target at or before the current one is
    /// refused and returns false.
    pub fn set_next_target(&mut self, target: Duration) -> bool {
        if target <= self.next_target {
            debug!(?target, current = ?self.next_target, "refusing non-increasing target");
            return false;
        }
        self.next_target = target;
        true
    }

    /// Recompute the target for a newly opened document so switching never
    /// fires immediately.
    pub fn reset_for_switch(&mut self, elapsed: Duration) {
        self.next_target = elapsed + self.interval;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn first_target_is_one_interval_out() {
        let clock = ActiveTimeClock::new(secs(30), Duration::ZERO);
        assert_eq!(clock.next_target(), secs(30));
        assert_eq!(clock.poll(secs(29)), None);
        assert_eq!(clock.poll(secs(30)), Some(secs(30)));
    }

    #[test]
    fn reached_target_stays_until_caller_advances() {
        let mut clock = ActiveTimeClock::new(secs(30), Duration::ZERO);
        assert_eq!(clock.poll(secs(31)), Some(secs(30)));
        assert_eq!(clock.poll(secs(31)), Some(secs(30)));

        assert!(clock.set_next_target(secs(60)));
        assert_eq!(clock.poll(secs(31)), None);
        assert_eq!(clock.threshold(secs(31)).next_target, secs(60));
    }

    #[test]
    fn target_never_moves_backwards() {
        let mut clock = ActiveTimeClock::new(secs(30), Duration::ZERO);
        assert!(!clock.set_next_target(secs(30)));
        assert!(!clock.set_next_target(secs(10)));
        assert_eq!(clock.next_target(), secs(30));
    }

    #[test]
    fn switch_resets_relative_to_current_elapsed() {
        let mut clock = ActiveTimeClock::new(secs(30), Duration::ZERO);
        clock.reset_for_switch(secs(45));
        assert_eq!(clock.next_target(), secs(75));
        assert_eq!(clock.poll(secs(45)), None);
        assert_eq!(clock.remaining(secs(45)), secs(30));
    }

    proptest! {
        #[test]
        fn targets_strictly_increase_across_firings(
            steps in proptest::collection::vec(1u64..120, 1..50),
        ) {
            let interval = secs(30);
            let mut clock = ActiveTimeClock::new(interval, Duration::ZERO);
            let mut elapsed = Duration::ZERO;
            let mut last = clock.next_target();
            for step in steps {
                elapsed += secs(step);
                if let Some(reached) = clock.poll(elapsed) {
                    prop_assert!(clock.set_next_target(reached + interval));
                    prop_assert!(clock.next_target() > last);
                    last = clock.next_target();
                }
            }
        }
    }
}
