//! Per-channel and per-pass sweep results.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use super::SweepError;
use crate::platform::ChannelId;

/// Outcome of sweeping one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepResult {
    pub channel_id: ChannelId,
    /// Messages removed by bulk delete calls.
    pub bulk_deleted: u64,
    /// Messages removed one at a time.
    pub individually_deleted: u64,
    /// Successful bulk delete calls.
    pub batch_calls: u64,
    /// Single deletes that failed and were skipped.
    pub individual_failures: u64,
    /// Messages seen but too young to delete.
    pub kept: u64,
    /// Why the sweep stopped early, if it did.
    #[serde(serialize_with = "serialize_failure")]
    pub failure: Option<SweepError>,
}

impl SweepResult {
    pub fn new(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            bulk_deleted: 0,
            individually_deleted: 0,
            batch_calls: 0,
            individual_failures: 0,
            kept: 0,
            failure: None,
        }
    }

    /// A channel that was never swept.
    pub fn failed(channel_id: ChannelId, failure: SweepError) -> Self {
        Self {
            failure: Some(failure),
            ..Self::new(channel_id)
        }
    }

    /// Total messages deleted in this channel.
    pub fn deleted(&self) -> u64 {
        self.bulk_deleted + self.individually_deleted
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub(crate) fn record_batch(&mut self, count: usize) {
        self.bulk_deleted += count as u64;
        self.batch_calls += 1;
    }
}

fn serialize_failure<S: Serializer>(
    failure: &Option<SweepError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match failure {
        Some(err) => serializer.collect_str(err),
        None => serializer.serialize_none(),
    }
}

/// Outcome of one cleanup pass over every configured channel.
#[derive(Debug, Clone, Serialize)]
pub struct CleanupReport {
    pub run_id: Uuid,
    /// Reference time shared by every channel in the pass.
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// One entry per configured channel, in configuration order.
    pub results: Vec<SweepResult>,
    pub total_deleted: u64,
    pub dry_run: bool,
}

impl CleanupReport {
    pub fn new(started_at: DateTime<Utc>, results: Vec<SweepResult>, duration_ms: u64) -> Self {
        let total_deleted = results.iter().map(SweepResult::deleted).sum();
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            duration_ms,
            results,
            total_deleted,
            dry_run: false,
        }
    }

    pub fn failed_channels(&self) -> impl Iterator<Item = &SweepResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    pub fn has_deletions(&self) -> bool {
        self.total_deleted > 0
    }

    /// Human-readable report, one line per channel plus a total.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for result in &self.results {
            match &result.failure {
                None => out.push_str(&format!(
                    "Channel {}: deleted {} messages.\n",
                    result.channel_id,
                    result.deleted()
                )),
                Some(SweepError::ChannelNotFound) => out.push_str(&format!(
                    "Could not find channel with ID {}\n",
                    result.channel_id
                )),
                Some(err) => out.push_str(&format!(
                    "Channel {}: deleted {} messages, then stopped: {}\n",
                    result.channel_id,
                    result.deleted(),
                    err
                )),
            }
        }

        let prefix = if self.dry_run {
            "Dry run complete. Would delete"
        } else {
            "Cleanup complete. Deleted"
        };
        out.push_str(&format!("{prefix} {} messages in total.", self.total_deleted));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::PlatformError;

    fn swept(id: u64, bulk: u64, individual: u64) -> SweepResult {
        SweepResult {
            bulk_deleted: bulk,
            individually_deleted: individual,
            ..SweepResult::new(ChannelId::new(id))
        }
    }

    #[test]
    fn test_total_is_sum_of_channels() {
        let report = CleanupReport::new(
            Utc::now(),
            vec![
                swept(1, 150, 30),
                SweepResult::failed(ChannelId::new(2), SweepError::ChannelNotFound),
                swept(3, 0, 4),
            ],
            12,
        );
        assert_eq!(report.total_deleted, 184);
        assert_eq!(report.failed_channels().count(), 1);
        assert!(report.has_deletions());
    }

    #[test]
    fn test_summary_lines() {
        let mut stopped = swept(3, 100, 0);
        stopped.failure = Some(SweepError::BatchDeleteFailed {
            count: 100,
            source: PlatformError::Http {
                status: 500,
                message: "boom".into(),
            },
        });
        let report = CleanupReport::new(
            Utc::now(),
            vec![
                swept(1, 10, 2),
                SweepResult::failed(ChannelId::new(2), SweepError::ChannelNotFound),
                stopped,
            ],
            5,
        );

        assert_eq!(
            report.summary(),
            "Channel 1: deleted 12 messages.\n\
             Could not find channel with ID 2\n\
             Channel 3: deleted 100 messages, then stopped: bulk delete of 100 messages failed: HTTP 500: boom\n\
             Cleanup complete. Deleted 112 messages in total."
        );
    }

    #[test]
    fn test_json_shape() {
        let report = CleanupReport::new(
            Utc::now(),
            vec![SweepResult::failed(
                ChannelId::new(2),
                SweepError::ChannelNotFound,
            )],
            5,
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["results"][0]["channel_id"], "2");
        assert_eq!(json["results"][0]["failure"], "channel not found");
        assert_eq!(json["total_deleted"], 0);
        assert_eq!(json["dry_run"], false);
    }
}
