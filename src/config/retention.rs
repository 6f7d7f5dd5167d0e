//! Message retention configuration.
//!
//! Configures which messages are old enough to purge and how the purge is
//! paced against the chat platform.
//!
//! # Example
//!
//! ```toml
//! [retention]
//! min_age_days = 7
//! bulk_window_days = 14
//! batch_capacity = 100
//! pacing_delay_ms = 1000
//! dry_run = false
//! ```

use serde::{Deserialize, Serialize};

use crate::retention::{PolicyError, RetentionPolicy};

/// Upper bound the chat platform accepts for a single bulk delete.
pub const MAX_BATCH_CAPACITY: usize = crate::platform::MAX_BULK_DELETE;

/// Upper bound for the age thresholds, about a century.
pub const MAX_AGE_DAYS: u32 = 36_500;

/// Message retention configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Messages younger than this many days are kept.
    /// Default: 7
    #[serde(default = "default_min_age_days")]
    pub min_age_days: u32,

    /// Age (in days) up to which messages may be removed with bulk deletes.
    /// Older messages are removed one at a time.
    /// Default: 14 (the platform's bulk delete limit)
    #[serde(default = "default_bulk_window_days")]
    pub bulk_window_days: u32,

    /// Maximum messages per bulk delete call.
    /// Default: 100
    #[serde(default = "default_batch_capacity")]
    pub batch_capacity: usize,

    /// Delay after each full batch and each individual delete (in milliseconds).
    /// Default: 1000
    #[serde(default = "default_pacing_delay_ms")]
    pub pacing_delay_ms: u64,

    /// If true, log what would be deleted without actually deleting.
    /// Default: false
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            min_age_days: default_min_age_days(),
            bulk_window_days: default_bulk_window_days(),
            batch_capacity: default_batch_capacity(),
            pacing_delay_ms: default_pacing_delay_ms(),
            dry_run: false,
        }
    }
}

fn default_min_age_days() -> u32 {
    7
}

fn default_bulk_window_days() -> u32 {
    14
}

fn default_batch_capacity() -> usize {
    MAX_BATCH_CAPACITY
}

fn default_pacing_delay_ms() -> u64 {
    1000
}

impl RetentionConfig {
    /// Get the pacing delay as a Duration.
    pub fn pacing_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.pacing_delay_ms)
    }

    /// Build the retention policy described by this section.
    ///
    /// Dry runs never touch the platform, so their pacing delay is zero.
    pub fn policy(&self) -> Result<RetentionPolicy, PolicyError> {
        let pacing = if self.dry_run {
            std::time::Duration::ZERO
        } else {
            self.pacing_delay()
        };

        RetentionPolicy::new(
            chrono::TimeDelta::days(i64::from(self.min_age_days)),
            chrono::TimeDelta::days(i64::from(self.bulk_window_days)),
            self.batch_capacity,
            pacing,
        )
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.batch_capacity == 0 || self.batch_capacity > MAX_BATCH_CAPACITY {
            return Err(format!(
                "retention.batch_capacity must be between 1 and {MAX_BATCH_CAPACITY}, got {}",
                self.batch_capacity
            ));
        }
        if self.bulk_window_days == 0 {
            return Err("retention.bulk_window_days must be greater than 0".into());
        }
        for (name, days) in [
            ("min_age_days", self.min_age_days),
            ("bulk_window_days", self.bulk_window_days),
        ] {
            if days > MAX_AGE_DAYS {
                return Err(format!(
                    "retention.{name} must be at most {MAX_AGE_DAYS}, got {days}"
                ));
            }
        }
        self.policy().map(|_| ()).map_err(|e| e.to_string())
    }
}
