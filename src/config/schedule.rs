//! Sweep schedule configuration.
//!
//! # Example
//!
//! ```toml
//! [schedule]
//! enabled = true
//! interval_minutes = 60
//! run_on_start = true
//! ```

use serde::{Deserialize, Serialize};

/// Longest accepted sweep interval, one year.
pub const MAX_INTERVAL_MINUTES: u64 = 365 * 24 * 60;

/// Periodic sweep configuration for the `run` daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    /// Whether the periodic trigger is active.
    /// Manual triggers work either way.
    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How often to run a sweep (in minutes).
    /// Default: 60
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,

    /// Run the first sweep immediately instead of after one interval.
    /// Default: true
    #[serde(default = "default_true")]
    pub run_on_start: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: default_interval_minutes(),
            run_on_start: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_interval_minutes() -> u64 {
    60
}

impl ScheduleConfig {
    /// Get the interval as a Duration.
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.enabled && self.interval_minutes == 0 {
            return Err("schedule.interval_minutes must be greater than 0".into());
        }
        if self.interval_minutes > MAX_INTERVAL_MINUTES {
            return Err(format!(
                "schedule.interval_minutes must be at most {MAX_INTERVAL_MINUTES}, got {}",
                self.interval_minutes
            ));
        }
        Ok(())
    }
}
