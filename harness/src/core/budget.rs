//! Turn and wall-clock budgets for a single test.

use std::time::Duration;

/// Per-invocation wall-clock limit, chosen once for the whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeoutPolicy {
    #[default]
    FiveMinutes,
    TenMinutes,
    Unbounded,
    Custom(Duration),
}

impl TimeoutPolicy {
    /// `None` means wait for the invocation indefinitely.
    pub fn duration(self) -> Option<Duration> {
        match self {
            TimeoutPolicy::FiveMinutes => Some(Duration::from_secs(5 * 60)),
            TimeoutPolicy::TenMinutes => Some(Duration::from_secs(10 * 60)),
            TimeoutPolicy::Unbounded => None,
            TimeoutPolicy::Custom(duration) => Some(duration),
        }
    }

    pub fn as_secs(self) -> Option<u64> {
        self.duration().map(|duration| duration.as_secs())
    }
}

/// Turns left for the reflection after turn 1 consumed `consumed` of `max_turns`.
///
/// `None` when nothing is left.
pub fn remaining_turns(max_turns: u32, consumed: u32) -> Option<u32> {
    match max_turns.saturating_sub(consumed) {
        0 => None,
        left => Some(left),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_turns_subtracts_consumed() {
        assert_eq!(remaining_turns(10, 3), Some(7));
        assert_eq!(remaining_turns(10, 9), Some(1));
    }

    #[test]
    fn remaining_turns_exhausted() {
        assert_eq!(remaining_turns(10, 10), None);
        assert_eq!(remaining_turns(4, 12), None);
    }

    #[test]
    fn timeout_policy_durations() {
        assert_eq!(TimeoutPolicy::FiveMinutes.as_secs(), Some(300));
        assert_eq!(TimeoutPolicy::TenMinutes.as_secs(), Some(600));
        assert_eq!(TimeoutPolicy::Unbounded.duration(), None);
        assert_eq!(
            TimeoutPolicy::Custom(Duration::from_millis(50)).duration(),
            Some(Duration::from_millis(50))
        );
    }
}
