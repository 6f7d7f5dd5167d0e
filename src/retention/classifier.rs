use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use super::RetentionPolicy;

/// What the sweep does with a message of a given age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Younger than the minimum age (or dated in the future).
    Keep,
    /// Old enough to delete and young enough for a bulk delete.
    BulkEligible,
    /// Too old for bulk deletes; must be deleted on its own.
    IndividualOnly,
}

/// Classify a message by age relative to `now`.
///
/// Both boundaries are inclusive on the deleting side: a message exactly
/// `min_age` old is deleted, and one exactly `bulk_window` old is still
/// bulk-eligible.
pub fn classify(
    now: DateTime<Utc>,
    created_at: DateTime<Utc>,
    policy: &RetentionPolicy,
) -> Classification {
    let age = now.signed_duration_since(created_at);

    if age < TimeDelta::zero() || age < policy.min_age() {
        Classification::Keep
    } else if age <= policy.bulk_window() {
        Classification::BulkEligible
    } else {
        Classification::IndividualOnly
    }
}
