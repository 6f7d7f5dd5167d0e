use std::{fmt, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

/// Age thresholds and pacing for one sweep pass.
///
/// Immutable for the duration of a pass. Construct with
/// [`RetentionPolicy::new`], which rejects policies that could never be
/// executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    min_age: TimeDelta,
    bulk_window: TimeDelta,
    batch_capacity: usize,
    pacing_delay: Duration,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("minimum age must not be negative")]
    NegativeMinAge,

    #[error("bulk window must be positive")]
    NonPositiveBulkWindow,

    #[error("batch capacity must be at least 1")]
    ZeroBatchCapacity,
}

impl RetentionPolicy {
    pub fn new(
        min_age: TimeDelta,
        bulk_window: TimeDelta,
        batch_capacity: usize,
        pacing_delay: Duration,
    ) -> Result<Self, PolicyError> {
        if min_age < TimeDelta::zero() {
            return Err(PolicyError::NegativeMinAge);
        }
        if bulk_window <= TimeDelta::zero() {
            return Err(PolicyError::NonPositiveBulkWindow);
        }
        if batch_capacity == 0 {
            return Err(PolicyError::ZeroBatchCapacity);
        }

        Ok(Self {
            min_age,
            bulk_window,
            batch_capacity,
            pacing_delay,
        })
    }

    /// Messages younger than this are kept.
    pub fn min_age(&self) -> TimeDelta {
        self.min_age
    }

    /// Messages up to this age (inclusive) may be bulk deleted.
    pub fn bulk_window(&self) -> TimeDelta {
        self.bulk_window
    }

    pub fn batch_capacity(&self) -> usize {
        self.batch_capacity
    }

    /// Sleep after each individual delete and each non-final batch.
    pub fn pacing_delay(&self) -> Duration {
        self.pacing_delay
    }

    pub fn with_pacing_delay(mut self, pacing_delay: Duration) -> Self {
        self.pacing_delay = pacing_delay;
        self
    }

    /// Upper bound (inclusive) for history traversal: nothing newer can be
    /// deleted. Clamps to the earliest representable time.
    pub fn history_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.min_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "delete after {}d, bulk up to {}d, batches of {}, {}ms pacing",
            self.min_age.num_days(),
            self.bulk_window.num_days(),
            self.batch_capacity,
            self.pacing_delay.as_millis()
        )
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(TimeDelta::days(-1), TimeDelta::days(14), 100, PolicyError::NegativeMinAge)]
    #[case(TimeDelta::days(7), TimeDelta::zero(), 100, PolicyError::NonPositiveBulkWindow)]
    #[case(TimeDelta::days(7), TimeDelta::days(14), 0, PolicyError::ZeroBatchCapacity)]
    fn test_rejects_unusable_policies(
        #[case] min_age: TimeDelta,
        #[case] bulk_window: TimeDelta,
        #[case] capacity: usize,
        #[case] expected: PolicyError,
    ) {
        assert_eq!(
            RetentionPolicy::new(min_age, bulk_window, capacity, Duration::ZERO),
            Err(expected)
        );
    }

    #[test]
    fn test_history_cutoff() {
        let policy =
            RetentionPolicy::new(TimeDelta::days(7), TimeDelta::days(14), 100, Duration::ZERO)
                .unwrap();
        let now = Utc::now();
        assert_eq!(policy.history_cutoff(now), now - TimeDelta::days(7));
    }

    #[test]
    fn test_history_cutoff_clamps_instead_of_overflowing() {
        let policy = RetentionPolicy::new(
            TimeDelta::days(100_000_000),
            TimeDelta::days(14),
            100,
            Duration::ZERO,
        )
        .unwrap();
        assert_eq!(policy.history_cutoff(Utc::now()), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_display() {
        let policy = RetentionPolicy::new(
            TimeDelta::days(7),
            TimeDelta::days(14),
            100,
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            policy.to_string(),
            "delete after 7d, bulk up to 14d, batches of 100, 1000ms pacing"
        );
    }
}
