//! Tick-based backoff for a fixed-interval source.
//!
//! The scheduler ticks every `interval`. After `threshold` consecutive failed
//! cycles the effective interval doubles per further failure, capped at
//! `ceiling`; the tracker expresses that as a number of ticks to skip. A
//! provider retry-after hint can stretch the pause further, but never past
//! `ceiling`. A successful cycle resets everything.
//!
//! Pure state machine: no clock access, no IO.

use std::time::Duration;

/// Default consecutive-failure count before the interval starts doubling.
pub const DEFAULT_BACKOFF_THRESHOLD: u32 = 3;

/// Default cap on the effective interval (1 hour).
pub const DEFAULT_BACKOFF_CEILING: Duration = Duration::from_secs(3_600);

/// Configuration for [`BackoffTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Consecutive failures tolerated at the base interval. `0` disables doubling.
    pub threshold: u32,
    /// Upper bound for the effective interval.
    pub ceiling: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_BACKOFF_THRESHOLD,
            ceiling: DEFAULT_BACKOFF_CEILING,
        }
    }
}

/// Tracks consecutive failures for one source and decides which ticks run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffTracker {
    interval: Duration,
    policy: BackoffPolicy,
    consecutive_failures: u32,
    ticks_to_skip: u32,
}

impl BackoffTracker {
    pub fn new(interval: Duration, policy: BackoffPolicy) -> Self {
        Self {
            interval,
            policy,
            consecutive_failures: 0,
            ticks_to_skip: 0,
        }
    }

    /// Consume one scheduler tick. Returns `false` if the tick is suppressed.
    pub fn should_run(&mut self) -> bool {
        if self.ticks_to_skip > 0 {
            self.ticks_to_skip -= 1;
            return false;
        }
        true
    }

    /// Record a failed cycle. Returns how many upcoming ticks will be skipped.
    pub fn record_failure(&mut self, retry_after: Option<Duration>) -> u32 {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        let mut skip = self.ticks_covering(self.effective_interval()).saturating_sub(1);
        if let Some(wait) = retry_after {
            let wait = wait.min(self.policy.ceiling);
            skip = skip.max(self.ticks_covering(wait).saturating_sub(1));
        }
        self.ticks_to_skip = skip;
        skip
    }

    /// Record a successful cycle: back to the base interval.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.ticks_to_skip = 0;
    }

    /// Interval currently in effect given the failure streak.
    pub fn effective_interval(&self) -> Duration {
        let threshold = self.policy.threshold;
        if threshold == 0 || self.consecutive_failures < threshold {
            return self.interval;
        }
        // threshold-th failure doubles once, each further failure doubles again.
        let doublings = (self.consecutive_failures - threshold + 1).min(31);
        let scaled = self.interval.saturating_mul(1u32 << doublings);
        scaled.min(self.policy.ceiling).max(self.interval)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn ticks_to_skip(&self) -> u32 {
        self.ticks_to_skip
    }

    /// Number of base ticks needed to cover `wait` (rounded up, at least 1).
    fn ticks_covering(&self, wait: Duration) -> u32 {
        if self.interval.is_zero() {
            return 1;
        }
        let ticks = wait.as_millis().div_ceil(self.interval.as_millis()).max(1);
        u32::try_from(ticks).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(interval_secs: u64, threshold: u32, ceiling_secs: u64) -> BackoffTracker {
        BackoffTracker::new(
            Duration::from_secs(interval_secs),
            BackoffPolicy {
                threshold,
                ceiling: Duration::from_secs(ceiling_secs),
            },
        )
    }

    #[test]
    fn fresh_tracker_runs_every_tick() {
        let mut t = tracker(60, 3, 600);
        assert!(t.should_run());
        assert!(t.should_run());
        assert_eq!(t.effective_interval(), Duration::from_secs(60));
    }

    #[test]
    fn failures_below_threshold_keep_base_interval() {
        let mut t = tracker(60, 3, 600);
        assert_eq!(t.record_failure(None), 0);
        assert_eq!(t.record_failure(None), 0);
        assert_eq!(t.consecutive_failures(), 2);
        assert!(t.should_run());
    }

    #[test]
    fn interval_doubles_past_threshold() {
        let mut t = tracker(60, 3, 600);
        t.record_failure(None);
        t.record_failure(None);

        // 3rd failure: 120s → skip 1 tick
        assert_eq!(t.record_failure(None), 1);
        assert_eq!(t.effective_interval(), Duration::from_secs(120));
        assert!(!t.should_run());
        assert!(t.should_run());

        // 4th failure: 240s → skip 3 ticks
        assert_eq!(t.record_failure(None), 3);
        assert_eq!(t.effective_interval(), Duration::from_secs(240));
    }

    #[test]
    fn interval_capped_at_ceiling() {
        let mut t = tracker(60, 1, 300);
        for _ in 0..10 {
            t.record_failure(None);
        }
        assert_eq!(t.effective_interval(), Duration::from_secs(300));
        assert_eq!(t.ticks_to_skip(), 4);
    }

    #[test]
    fn ceiling_below_interval_never_shrinks() {
        let mut t = tracker(600, 1, 60);
        t.record_failure(None);
        assert_eq!(t.effective_interval(), Duration::from_secs(600));
        assert_eq!(t.ticks_to_skip(), 0);
    }

    #[test]
    fn zero_threshold_disables_doubling() {
        let mut t = tracker(60, 0, 600);
        for _ in 0..5 {
            assert_eq!(t.record_failure(None), 0);
        }
    }

    #[test]
    fn retry_after_extends_pause() {
        let mut t = tracker(60, 3, 600);
        // 300s retry-after at 60s ticks: 5 ticks cover it → skip 4.
        assert_eq!(t.record_failure(Some(Duration::from_secs(300))), 4);
        // Shorter than one interval: no extra skip.
        assert_eq!(t.record_failure(Some(Duration::from_secs(10))), 0);
    }

    #[test]
    fn retry_after_is_capped_at_ceiling() {
        let mut t = tracker(60, 3, 600);
        // A reset timestamp a day away still pauses for at most 600s.
        assert_eq!(t.record_failure(Some(Duration::from_secs(86_400))), 9);
        assert_eq!(t.record_failure(Some(Duration::MAX)), 9);
    }

    #[test]
    fn success_resets() {
        let mut t = tracker(60, 1, 600);
        t.record_failure(None);
        t.record_failure(None);
        assert!(t.ticks_to_skip() > 0);

        t.record_success();
        assert_eq!(t.consecutive_failures(), 0);
        assert_eq!(t.effective_interval(), Duration::from_secs(60));
        assert!(t.should_run());
    }
}
