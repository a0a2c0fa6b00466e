//! Bounded retry with exponential backoff.
//!
//! Attempts are numbered from 0. Before attempt `k >= 1` the caller waits
//! `unit * 2^(k-1)`, capped at `max_delay`. There is no wait after the last
//! attempt, so a policy with `max_retries = n` produces `n - 1` delays.

use std::time::Duration;
use thiserror::Error;

/// Default number of attempts for transient failures.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default delay before the first retry.
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(1);

/// Default upper bound for a single delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Errors from building a retry policy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("max_retries must be at least 1")]
    ZeroRetries,

    #[error("backoff unit must be greater than zero")]
    ZeroBackoffUnit,

    #[error("max_delay ({max_delay:?}) must not be shorter than the backoff unit ({unit:?})")]
    MaxDelayBelowUnit { unit: Duration, max_delay: Duration },

    #[error("fallback model must not be empty")]
    EmptyFallbackModel,
}

/// How often and how patiently to retry transient failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff_unit: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Policy with `max_retries` total attempts and default timing.
    pub fn new(max_retries: u32) -> Result<Self, PolicyError> {
        Self::with_timing(max_retries, DEFAULT_BACKOFF_UNIT, DEFAULT_MAX_DELAY)
    }

    /// Policy with explicit timing.
    pub fn with_timing(
        max_retries: u32,
        backoff_unit: Duration,
        max_delay: Duration,
    ) -> Result<Self, PolicyError> {
        if max_retries == 0 {
            return Err(PolicyError::ZeroRetries);
        }
        if backoff_unit.is_zero() {
            return Err(PolicyError::ZeroBackoffUnit);
        }
        if max_delay < backoff_unit {
            return Err(PolicyError::MaxDelayBelowUnit {
                unit: backoff_unit,
                max_delay,
            });
        }

        Ok(Self {
            max_retries,
            backoff_unit,
            max_delay,
        })
    }

    /// Total attempts allowed for transient failures.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn backoff_unit(&self) -> Duration {
        self.backoff_unit
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// The delays between attempts, in order.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + Send + 'static {
        let (unit, max_delay) = (self.backoff_unit, self.max_delay);
        (0..self.max_retries.saturating_sub(1)).map(move |k| backoff_delay(unit, max_delay, k))
    }

    /// Fresh state for one call.
    pub fn start(&self) -> RetryState {
        RetryState {
            attempts: 0,
            max_retries: self.max_retries,
            backoff_unit: self.backoff_unit,
            max_delay: self.max_delay,
        }
    }
}

/// `unit * 2^k`, capped at `max_delay`. Exact for any unit.
fn backoff_delay(unit: Duration, max_delay: Duration, k: u32) -> Duration {
    1u32.checked_shl(k)
        .and_then(|factor| unit.checked_mul(factor))
        .map_or(max_delay, |delay| delay.min(max_delay))
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

/// Attempt bookkeeping for a single call.
///
/// Never shared between calls; dropped once the call reaches a terminal state.
#[derive(Debug)]
pub struct RetryState {
    attempts: u32,
    max_retries: u32,
    backoff_unit: Duration,
    max_delay: Duration,
}

impl RetryState {
    /// Attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record an outbound attempt and return its 0-based number.
    pub fn record_attempt(&mut self) -> u32 {
        debug_assert!(self.attempts < self.max_retries);
        let attempt = self.attempts;
        self.attempts += 1;
        attempt
    }

    /// Delay before the next attempt, or `None` once attempts are used up.
    pub fn next_delay(&self) -> Option<Duration> {
        if !self.can_retry() || self.attempts == 0 {
            return None;
        }
        Some(backoff_delay(
            self.backoff_unit,
            self.max_delay,
            self.attempts - 1,
        ))
    }

    /// Whether another attempt is allowed.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn secs(values: &[u64]) -> Vec<Duration> {
        values.iter().map(|s| Duration::from_secs(*s)).collect()
    }

    #[test]
    fn test_default_policy_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries(), 5);
        assert_eq!(policy.delays().collect::<Vec<_>>(), secs(&[1, 2, 4, 8]));
    }

    #[test]
    fn test_single_attempt_has_no_delays() {
        let policy = RetryPolicy::new(1).unwrap();
        assert_eq!(policy.delays().count(), 0);

        let mut state = policy.start();
        assert_eq!(state.record_attempt(), 0);
        assert_eq!(state.next_delay(), None);
    }

    #[test]
    fn test_rejects_invalid_policies() {
        assert_eq!(RetryPolicy::new(0), Err(PolicyError::ZeroRetries));
        assert_eq!(
            RetryPolicy::with_timing(3, Duration::ZERO, DEFAULT_MAX_DELAY),
            Err(PolicyError::ZeroBackoffUnit)
        );
        assert!(matches!(
            RetryPolicy::with_timing(3, Duration::from_secs(10), Duration::from_secs(5)),
            Err(PolicyError::MaxDelayBelowUnit { .. })
        ));
    }

    #[test]
    fn test_state_walks_through_attempts() {
        let policy = RetryPolicy::new(3).unwrap();
        let mut state = policy.start();

        assert_eq!(state.record_attempt(), 0);
        assert_eq!(state.next_delay(), Some(Duration::from_secs(1)));
        assert_eq!(state.record_attempt(), 1);
        assert_eq!(state.next_delay(), Some(Duration::from_secs(2)));
        assert_eq!(state.record_attempt(), 2);
        assert!(!state.can_retry());
        assert_eq!(state.next_delay(), None);
        assert_eq!(state.attempts(), 3);
    }

    #[test]
    fn test_sub_second_unit_is_exact() {
        let policy =
            RetryPolicy::with_timing(5, Duration::from_millis(100), DEFAULT_MAX_DELAY).unwrap();
        let expected: Vec<Duration> = [100, 200, 400, 800]
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect();
        assert_eq!(policy.delays().collect::<Vec<_>>(), expected);

        let mut state = policy.start();
        state.record_attempt();
        assert_eq!(state.next_delay(), Some(Duration::from_millis(100)));
        state.record_attempt();
        assert_eq!(state.next_delay(), Some(Duration::from_millis(200)));
    }

    #[test]
    fn test_large_attempt_counts_saturate_at_cap() {
        let policy = RetryPolicy::with_timing(64, Duration::from_secs(1), Duration::from_secs(60))
            .unwrap();
        assert!(policy.delays().all(|d| d <= Duration::from_secs(60)));
        assert_eq!(policy.delays().last(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_delays_are_capped() {
        let policy =
            RetryPolicy::with_timing(6, Duration::from_secs(1), Duration::from_secs(5)).unwrap();
        assert_eq!(policy.delays().collect::<Vec<_>>(), secs(&[1, 2, 4, 5, 5]));
    }

    proptest! {
        #[test]
        fn prop_delays_double_until_cap(
            max_retries in 1u32..16,
            unit_ms in 1u64..5_000,
            cap_factor in 1u64..2048,
        ) {
            let unit = Duration::from_millis(unit_ms);
            let max_delay = Duration::from_millis(unit_ms * cap_factor);
            let policy = RetryPolicy::with_timing(max_retries, unit, max_delay).unwrap();

            let delays: Vec<Duration> = policy.delays().collect();
            prop_assert_eq!(delays.len(), (max_retries - 1) as usize);

            for (k, delay) in delays.iter().enumerate() {
                let expected = unit.saturating_mul(1u32 << k).min(max_delay);
                prop_assert_eq!(*delay, expected);
            }
        }

        #[test]
        fn prop_state_never_exceeds_max(max_retries in 1u32..32) {
            let policy = RetryPolicy::new(max_retries).unwrap();
            let mut state = policy.start();

            state.record_attempt();
            while state.next_delay().is_some() {
                state.record_attempt();
            }
            prop_assert_eq!(state.attempts(), max_retries);
        }
    }
}
